pub mod activity;
pub mod metrics;
pub mod wire;

pub use activity::{ActivityEntry, ActivityLog};
pub use metrics::{HighlightEpoch, SuccessRecord, TrainingMetrics};
pub use wire::{
    decode_message, register_message, Command, CommandError, DeviceMessage, EventEnvelope,
    EventKind, Mode, OverrideMode, ServoAction,
};
