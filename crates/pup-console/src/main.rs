mod history;
mod session;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use chrono::Utc;
use clap::Parser;
use crossterm::{
    event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use history::{format_point, HistoryClient, Point, DEFAULT_POINT_LIMIT};
use pup_core::activity::ActivityLog;
use pup_core::metrics::{HighlightEpoch, TrainingMetrics, HIGHLIGHT_WINDOW_MS};
use pup_core::wire::{
    decode_message, Command, DeviceMessage, EventEnvelope, EventKind, Mode, OverrideMode,
    ServoAction,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Terminal,
};
use session::{Session, SessionEvent, SessionState};
use std::{env, error::Error, io, path::Path, time::Duration};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

const SESSION_QUEUE_CAPACITY: usize = 256;
const UI_QUEUE_CAPACITY: usize = 64;
const DEFAULT_DEVICE_PORT: u16 = 8765;
const DEFAULT_DEVICE_PATH: &str = "/ws";
const DEFAULT_API_URL: &str = "http://127.0.0.1:4000";
const RAW_PREVIEW_CHARS: usize = 120;

#[derive(Parser, Debug)]
#[command(name = "pup-console")]
struct Args {
    /// Device WebSocket URL; overrides the computed default.
    #[arg(long, default_value = "")]
    endpoint: String,
    /// Use wss:// for the computed default endpoint.
    #[arg(long, default_value_t = false)]
    secure: bool,
    /// Base URL of the measurements API.
    #[arg(long, default_value = "")]
    api: String,
    /// Client name sent in the registration frame.
    #[arg(long, default_value = "")]
    name: String,
}

#[derive(Clone, Debug)]
struct Config {
    endpoint: Url,
    api_url: String,
    client_name: String,
}

fn load_config(args: &Args) -> Result<Config, Box<dyn Error>> {
    let secure = args.secure
        || matches!(
            env::var("PUP_SECURE").ok().as_deref(),
            Some("1") | Some("true") | Some("yes")
        );
    let endpoint = if !args.endpoint.is_empty() {
        args.endpoint.clone()
    } else if let Ok(value) = env::var("PUP_DEVICE_WS") {
        value
    } else {
        let scheme = if secure { "wss" } else { "ws" };
        format!("{scheme}://127.0.0.1:{DEFAULT_DEVICE_PORT}{DEFAULT_DEVICE_PATH}")
    };
    let api_url = if !args.api.is_empty() {
        args.api.clone()
    } else {
        env::var("PUP_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string())
    };
    let client_name = if !args.name.is_empty() {
        args.name.clone()
    } else {
        env::var("PUP_CLIENT_NAME")
            .unwrap_or_else(|_| format!("pup-console-{}", std::process::id()))
    };
    Ok(Config {
        endpoint: Url::parse(&endpoint)?,
        api_url,
        client_name,
    })
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_enabled = matches!(
        env::var("PUP_LOG_STDOUT").ok().as_deref(),
        Some("1") | Some("true") | Some("TRUE") | Some("yes") | Some("YES")
    );
    if stdout_enabled {
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    } else {
        // the TUI owns the terminal
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::sink)
            .try_init();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum View {
    Live,
    History,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum InputMode {
    Normal,
    EditSpeak,
    EditAudioPath,
    EditEndpoint,
}

#[derive(Debug)]
enum UiEvent {
    HighlightElapsed(HighlightEpoch),
    Measurements(Result<Vec<String>, String>),
    Points {
        measurement: String,
        result: Result<Vec<Point>, String>,
    },
    AudioLoaded {
        filename: String,
        b64: String,
    },
    AudioLoadFailed {
        path: String,
        detail: String,
    },
}

#[derive(Debug, Default)]
struct HistoryState {
    measurements: Vec<String>,
    selected: usize,
    points_for: Option<String>,
    points: Vec<Point>,
    loading: bool,
    error: Option<String>,
}

impl HistoryState {
    fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    fn select_next(&mut self) {
        if !self.measurements.is_empty() {
            self.selected = (self.selected + 1).min(self.measurements.len() - 1);
        }
    }

    fn selected_measurement(&self) -> Option<&str> {
        self.measurements.get(self.selected).map(String::as_str)
    }
}

struct App {
    session: Session,
    metrics: TrainingMetrics,
    activity: ActivityLog,
    history_client: HistoryClient,
    history: HistoryState,
    ui_tx: mpsc::Sender<UiEvent>,
    view: View,
    input_mode: InputMode,
    input_buffer: String,
    device_mode: Option<Mode>,
    last_pose: Option<String>,
    treat_override_disabled: bool,
    status_note: Option<String>,
    should_exit: bool,
}

impl App {
    fn new(
        config: Config,
        session_tx: mpsc::Sender<SessionEvent>,
        ui_tx: mpsc::Sender<UiEvent>,
    ) -> Self {
        let session = Session::new(
            config.endpoint.clone(),
            config.client_name.clone(),
            session_tx,
        );
        let history_client = HistoryClient::new(config.api_url.clone());
        Self {
            session,
            metrics: TrainingMetrics::new(),
            activity: ActivityLog::new(),
            history_client,
            history: HistoryState::default(),
            ui_tx,
            view: View::Live,
            input_mode: InputMode::Normal,
            input_buffer: String::new(),
            device_mode: None,
            last_pose: None,
            treat_override_disabled: false,
            status_note: None,
            should_exit: false,
        }
    }

    /// Routes one transport callback. Returns the highlight epoch when an
    /// inbound event credited a success, so the caller schedules the clear.
    fn apply_session_event(&mut self, event: SessionEvent) -> Option<HighlightEpoch> {
        let raw = self.session.handle_event(event, &mut self.activity)?;
        self.handle_inbound(&raw)
    }

    fn handle_inbound(&mut self, raw: &str) -> Option<HighlightEpoch> {
        match decode_message(raw) {
            DeviceMessage::Event(envelope) => {
                self.activity.append(describe_event(&envelope));
                match envelope.event_kind() {
                    EventKind::ModeChanged => {
                        self.device_mode =
                            envelope.payload_str("mode").and_then(|m| m.parse().ok());
                    }
                    EventKind::PoseTransition => {
                        self.last_pose = envelope.payload_str("to").map(str::to_string);
                    }
                    EventKind::TreatOverride => {
                        if let Some(mode) = envelope.payload_str("mode") {
                            self.treat_override_disabled = mode.eq_ignore_ascii_case("disable");
                        }
                    }
                    _ => {}
                }
                self.metrics.apply_event(&envelope, Utc::now())
            }
            DeviceMessage::Unstructured(text) => {
                self.activity
                    .append(format!("device: {}", preview(&text, RAW_PREVIEW_CHARS)));
                None
            }
        }
    }

    fn apply_ui_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::HighlightElapsed(epoch) => {
                self.metrics.clear_highlight(epoch);
            }
            UiEvent::Measurements(result) => {
                self.history.loading = false;
                match result {
                    Ok(measurements) => {
                        if self.history.selected >= measurements.len() {
                            self.history.selected = 0;
                        }
                        self.history.measurements = measurements;
                        self.history.error = None;
                    }
                    Err(detail) => {
                        self.activity.append(format!("history error: {detail}"));
                        self.history.error = Some(detail);
                    }
                }
            }
            UiEvent::Points {
                measurement,
                result,
            } => {
                self.history.loading = false;
                match result {
                    Ok(points) => {
                        self.activity.append(format!(
                            "loaded {} point(s) from {measurement}",
                            points.len()
                        ));
                        self.history.points_for = Some(measurement);
                        self.history.points = points;
                        self.history.error = None;
                    }
                    Err(detail) => {
                        self.activity.append(format!("history error: {detail}"));
                        self.history.error = Some(detail);
                    }
                }
            }
            UiEvent::AudioLoaded { filename, b64 } => {
                self.dispatch_command(Command::PlayAudio { b64, filename });
            }
            UiEvent::AudioLoadFailed { path, detail } => {
                self.activity
                    .append(format!("audio load failed ({path}): {detail}"));
                self.status_note = Some(format!("audio load failed: {detail}"));
            }
        }
    }

    fn dispatch_command(&mut self, command: Command) {
        match self.session.send(&command, &mut self.activity) {
            Ok(()) => {
                self.status_note = None;
                if let Command::OverrideTreat { mode } = command {
                    self.treat_override_disabled = mode == OverrideMode::Disable;
                }
            }
            Err(err) => {
                self.status_note = Some(err.to_string());
            }
        }
    }

    fn request_measurements(&mut self) {
        if self.history.loading {
            return;
        }
        self.history.loading = true;
        let client = self.history_client.clone();
        let tx = self.ui_tx.clone();
        tokio::spawn(async move {
            let result = client
                .measurements()
                .await
                .map_err(|err| err.to_string());
            let _ = tx.send(UiEvent::Measurements(result)).await;
        });
    }

    fn request_points(&mut self) {
        if self.history.loading {
            return;
        }
        let Some(measurement) = self.history.selected_measurement() else {
            return;
        };
        let measurement = measurement.to_string();
        self.history.loading = true;
        let client = self.history_client.clone();
        let tx = self.ui_tx.clone();
        tokio::spawn(async move {
            let result = client
                .points(&measurement, DEFAULT_POINT_LIMIT)
                .await
                .map_err(|err| err.to_string());
            let _ = tx
                .send(UiEvent::Points {
                    measurement,
                    result,
                })
                .await;
        });
    }

    fn request_audio_load(&mut self, path: String) {
        let tx = self.ui_tx.clone();
        self.activity.append(format!("loading audio clip {path}"));
        tokio::spawn(async move {
            match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    let b64 = BASE64_STANDARD.encode(&bytes);
                    let filename = Path::new(&path)
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_else(|| path.clone());
                    let _ = tx.send(UiEvent::AudioLoaded { filename, b64 }).await;
                }
                Err(err) => {
                    let _ = tx
                        .send(UiEvent::AudioLoadFailed {
                            path,
                            detail: err.to_string(),
                        })
                        .await;
                }
            }
        });
    }

    fn commit_input(&mut self) {
        let buffer = std::mem::take(&mut self.input_buffer);
        let mode = std::mem::replace(&mut self.input_mode, InputMode::Normal);
        match mode {
            InputMode::EditSpeak => {
                self.dispatch_command(Command::Speak { text: buffer });
            }
            InputMode::EditAudioPath => {
                if buffer.trim().is_empty() {
                    self.status_note = Some("audio path is empty".to_string());
                } else {
                    self.request_audio_load(buffer);
                }
            }
            InputMode::EditEndpoint => match Url::parse(buffer.trim()) {
                Ok(endpoint) => {
                    self.session.set_endpoint(endpoint, &mut self.activity);
                }
                Err(err) => {
                    self.activity
                        .append(format!("invalid endpoint '{buffer}': {err}"));
                    self.status_note = Some(format!("invalid endpoint: {err}"));
                }
            },
            InputMode::Normal => {}
        }
    }
}

fn describe_event(envelope: &EventEnvelope) -> String {
    match envelope.event_kind() {
        EventKind::CommandSuccess => {
            let pose = envelope.payload_str("target_pose").unwrap_or("?");
            format!("event command_success (pose {pose})")
        }
        EventKind::TreatGiven => {
            let reason = envelope.payload_str("reason").unwrap_or("unspecified");
            format!("event treat_given (reason {reason})")
        }
        EventKind::ModeChanged => {
            let mode = envelope.payload_str("mode").unwrap_or("?");
            format!("event mode_changed ({mode})")
        }
        EventKind::PoseTransition => {
            let from = envelope.payload_str("from").unwrap_or("?");
            let to = envelope.payload_str("to").unwrap_or("?");
            format!("event pose_transition ({from} -> {to})")
        }
        EventKind::ServoAction => {
            let action = envelope.payload_str("action").unwrap_or("?");
            format!("event servo_action ({action})")
        }
        EventKind::AudioPlayback => {
            let method = envelope.payload_str("method").unwrap_or("?");
            format!("event audio_playback ({method})")
        }
        EventKind::TreatOverride => {
            let mode = envelope.payload_str("mode").unwrap_or("?");
            format!("event treat_override ({mode})")
        }
        EventKind::Other => format!("event {}", envelope.name),
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{cut}…")
}

fn schedule_highlight_clear(tx: mpsc::Sender<UiEvent>, epoch: HighlightEpoch) {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(HIGHLIGHT_WINDOW_MS)).await;
        let _ = tx.send(UiEvent::HighlightElapsed(epoch)).await;
    });
}

fn handle_input(event: Event, app: &mut App) -> bool {
    let Event::Key(key) = event else {
        return false;
    };
    if key.kind != KeyEventKind::Press {
        return false;
    }
    if app.input_mode != InputMode::Normal {
        handle_edit_key(key, app);
        return false;
    }
    match app.view {
        View::Live => handle_live_key(key, app),
        View::History => handle_history_key(key, app),
    }
    app.should_exit
}

fn handle_edit_key(key: KeyEvent, app: &mut App) {
    match key.code {
        KeyCode::Esc => {
            app.input_buffer.clear();
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => app.commit_input(),
        KeyCode::Backspace => {
            app.input_buffer.pop();
        }
        KeyCode::Char(c) => app.input_buffer.push(c),
        _ => {}
    }
}

fn handle_live_key(key: KeyEvent, app: &mut App) {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => app.should_exit = true,
        KeyCode::Char('c') => app.session.connect(&mut app.activity),
        KeyCode::Char('d') => app.session.disconnect(&mut app.activity),
        KeyCode::Char('a') => app.dispatch_command(Command::SetMode { mode: Mode::Auto }),
        KeyCode::Char('m') => app.dispatch_command(Command::SetMode { mode: Mode::Manual }),
        KeyCode::Char('t') => app.dispatch_command(Command::TreatNow),
        KeyCode::Char('s') => app.dispatch_command(Command::Servo {
            action: ServoAction::Sweep,
        }),
        KeyCode::Char('o') => {
            let mode = if app.treat_override_disabled {
                OverrideMode::Enable
            } else {
                OverrideMode::Disable
            };
            app.dispatch_command(Command::OverrideTreat { mode });
        }
        KeyCode::Char('k') => app.input_mode = InputMode::EditSpeak,
        KeyCode::Char('u') => app.input_mode = InputMode::EditAudioPath,
        KeyCode::Char('e') => {
            app.input_buffer = app.session.endpoint().to_string();
            app.input_mode = InputMode::EditEndpoint;
        }
        KeyCode::Char('h') => {
            app.view = View::History;
            if app.history.measurements.is_empty() {
                app.request_measurements();
            }
        }
        _ => {}
    }
}

fn handle_history_key(key: KeyEvent, app: &mut App) {
    match key.code {
        KeyCode::Char('q') => app.should_exit = true,
        KeyCode::Char('h') | KeyCode::Esc => app.view = View::Live,
        KeyCode::Char('r') => app.request_measurements(),
        KeyCode::Up => app.history.select_prev(),
        KeyCode::Down => app.history.select_next(),
        KeyCode::Enter => app.request_points(),
        _ => {}
    }
}

#[derive(Clone, Copy)]
struct Theme {
    border: Color,
    title: Color,
    text: Color,
    muted: Color,
    accent: Color,
    ok: Color,
    warn: Color,
    critical: Color,
}

fn theme() -> Theme {
    Theme {
        border: Color::Rgb(71, 85, 105),
        title: Color::Rgb(191, 219, 254),
        text: Color::Rgb(226, 232, 240),
        muted: Color::Rgb(148, 163, 184),
        accent: Color::Rgb(56, 189, 248),
        ok: Color::Rgb(34, 197, 94),
        warn: Color::Rgb(245, 158, 11),
        critical: Color::Rgb(239, 68, 68),
    }
}

fn state_color(state: SessionState, theme: Theme) -> Color {
    match state {
        SessionState::Open => theme.ok,
        SessionState::Connecting => theme.warn,
        SessionState::Disconnected | SessionState::Closed => theme.critical,
    }
}

fn render_ui(frame: &mut ratatui::Frame, app: &App) {
    let size = frame.size();
    let theme = theme();
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Length(3),
            Constraint::Min(0),
        ])
        .split(size);
    frame.render_widget(render_header(app, theme), layout[0]);
    frame.render_widget(render_kpis(app, theme), layout[1]);
    match app.view {
        View::Live => render_live(frame, app, theme, layout[2]),
        View::History => render_history(frame, app, theme, layout[2]),
    }
    if app.input_mode != InputMode::Normal {
        render_input_modal(frame, app, theme, size);
    }
}

fn render_header(app: &App, theme: Theme) -> Paragraph<'_> {
    let state = app.session.state();
    let mode = app
        .device_mode
        .map(Mode::as_str)
        .unwrap_or("unknown");
    let pose = app.last_pose.as_deref().unwrap_or("-");
    let mut lines = vec![
        Line::from(vec![
            Span::styled(
                "PUP OPS ",
                Style::default()
                    .fg(theme.title)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                app.session.endpoint().to_string(),
                Style::default().fg(theme.muted),
            ),
        ]),
        Line::from(vec![
            Span::styled("session ", Style::default().fg(theme.muted)),
            Span::styled(
                state.as_str(),
                Style::default()
                    .fg(state_color(state, theme))
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("  mode {mode}  pose {pose}"),
                Style::default().fg(theme.text),
            ),
            Span::styled(
                if app.treat_override_disabled {
                    "  treats disabled"
                } else {
                    ""
                },
                Style::default().fg(theme.warn),
            ),
        ]),
    ];
    if let Some(note) = &app.status_note {
        lines.push(Line::from(Span::styled(
            note.clone(),
            Style::default().fg(theme.critical),
        )));
    }
    Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme.border)),
    )
}

fn render_kpis(app: &App, theme: Theme) -> Paragraph<'_> {
    let highlight = app.metrics.highlight_active();
    let success_style = if highlight {
        Style::default()
            .fg(Color::Black)
            .bg(theme.ok)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(theme.text)
    };
    let line = Line::from(vec![
        Span::styled(
            format!(" successes {} ", app.metrics.success_count()),
            success_style,
        ),
        Span::raw("  "),
        Span::styled(
            format!("treats {}", app.metrics.treat_count()),
            Style::default().fg(theme.text),
        ),
        Span::raw("  "),
        Span::styled(
            if highlight { "SUCCESS!" } else { "" },
            Style::default()
                .fg(theme.accent)
                .add_modifier(Modifier::BOLD),
        ),
    ]);
    Paragraph::new(line).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme.border))
            .title(Span::styled("counters", Style::default().fg(theme.title))),
    )
}

fn render_live(frame: &mut ratatui::Frame, app: &App, theme: Theme, area: Rect) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(area);

    let successes: Vec<ListItem> = app
        .metrics
        .recent_successes()
        .map(|record| {
            let what = record
                .target_pose
                .as_deref()
                .or(record.text.as_deref())
                .or(record.filename.as_deref())
                .unwrap_or("success");
            ListItem::new(Line::from(vec![
                Span::styled(
                    record.when.format("%H:%M:%S ").to_string(),
                    Style::default().fg(theme.muted),
                ),
                Span::styled(what.to_string(), Style::default().fg(theme.ok)),
            ]))
        })
        .collect();
    frame.render_widget(
        List::new(successes).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.border))
                .title(Span::styled(
                    "recent successes",
                    Style::default().fg(theme.title),
                )),
        ),
        columns[0],
    );

    let visible = columns[1].height.saturating_sub(2) as usize;
    let entries: Vec<ListItem> = app
        .activity
        .entries()
        .take(visible.max(1))
        .map(|entry| {
            ListItem::new(Span::styled(
                entry.display_line(),
                Style::default().fg(theme.text),
            ))
        })
        .collect();
    frame.render_widget(
        List::new(entries).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.border))
                .title(Span::styled(
                    "activity  [c]onnect [d]isconnect [a]uto [m]anual [t]reat [s]weep [o]verride [k]speak [u]pload [h]istory [q]uit",
                    Style::default().fg(theme.muted),
                )),
        ),
        columns[1],
    );
}

fn render_history(frame: &mut ratatui::Frame, app: &App, theme: Theme, area: Rect) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
        .split(area);

    let items: Vec<ListItem> = app
        .history
        .measurements
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let style = if idx == app.history.selected {
                Style::default()
                    .fg(theme.accent)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(theme.text)
            };
            ListItem::new(Span::styled(name.clone(), style))
        })
        .collect();
    let title = if app.history.loading {
        "measurements (loading…)"
    } else {
        "measurements  [r]efresh [enter]load [h]back"
    };
    frame.render_widget(
        List::new(items).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.border))
                .title(Span::styled(title, Style::default().fg(theme.muted))),
        ),
        columns[0],
    );

    let mut lines: Vec<Line> = Vec::new();
    if let Some(error) = &app.history.error {
        lines.push(Line::from(Span::styled(
            error.clone(),
            Style::default().fg(theme.critical),
        )));
    }
    for point in &app.history.points {
        lines.push(Line::from(Span::styled(
            format_point(point),
            Style::default().fg(theme.text),
        )));
    }
    let title = app
        .history
        .points_for
        .as_deref()
        .map(|name| format!("points: {name} (newest first)"))
        .unwrap_or_else(|| "points".to_string());
    frame.render_widget(
        Paragraph::new(lines).wrap(Wrap { trim: true }).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.border))
                .title(Span::styled(title, Style::default().fg(theme.title))),
        ),
        columns[1],
    );
}

fn render_input_modal(frame: &mut ratatui::Frame, app: &App, theme: Theme, size: Rect) {
    let title = match app.input_mode {
        InputMode::EditSpeak => "speak text (enter to send, esc to cancel)",
        InputMode::EditAudioPath => "audio file path (enter to upload, esc to cancel)",
        InputMode::EditEndpoint => "device endpoint (enter to apply, esc to cancel)",
        InputMode::Normal => "",
    };
    let width = size.width.saturating_sub(8).min(72).max(20);
    let area = Rect {
        x: size.width.saturating_sub(width) / 2,
        y: size.height.saturating_sub(3) / 2,
        width,
        height: size.height.min(3),
    };
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(Span::styled(
            app.input_buffer.clone(),
            Style::default().fg(theme.text),
        ))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.accent))
                .title(Span::styled(title, Style::default().fg(theme.title))),
        ),
        area,
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_logging();
    info!("pup_console_start: endpoint={}", config.endpoint);

    let (session_tx, mut session_rx) = mpsc::channel(SESSION_QUEUE_CAPACITY);
    let (ui_tx, mut ui_rx) = mpsc::channel(UI_QUEUE_CAPACITY);
    let mut app = App::new(config, session_tx, ui_tx.clone());
    app.activity
        .append("press c to connect to the trainer device");

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    let mut events = EventStream::new();

    loop {
        terminal.draw(|frame| render_ui(frame, &app))?;
        tokio::select! {
            Some(event) = session_rx.recv() => {
                if let Some(epoch) = app.apply_session_event(event) {
                    schedule_highlight_clear(ui_tx.clone(), epoch);
                }
            }
            Some(event) = ui_rx.recv() => {
                app.apply_ui_event(event);
            }
            maybe_event = events.next() => {
                if let Some(Ok(event)) = maybe_event {
                    if handle_input(event, &mut app) {
                        break;
                    }
                }
            }
        }
        if app.should_exit {
            break;
        }
    }

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}
