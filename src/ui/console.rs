//! The full-screen clinician console.
//!
//! One vertical layout: transcript on top, input box below, a status
//! title carrying the hospital, role, and streaming indicator. The loop
//! polls terminal events at 50 ms and drains stream/demo channels
//! between draws, so delta fragments render as they arrive.

use std::error::Error;
use std::io;
use std::time::Duration;

use ratatui::crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers, MouseEventKind};
use ratatui::crossterm::execute;
use ratatui::crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame, Terminal,
};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::audit::{AuditEvent, AuditLogger, FunctionsSink};
use crate::core::chat_stream::{ChatStreamService, StreamParams};
use crate::core::config::Config;
use crate::core::context::SessionContext;
use crate::core::conversation::Conversation;
use crate::core::demo::{DemoScenario, DemoScript, DemoStep};
use crate::core::message::TranscriptRole;

struct ConsoleApp {
    conversation: Conversation,
    demo: Option<DemoScript>,
    input: String,
    scroll_offset: u16,
    auto_scroll: bool,
    hospital_label: String,
    role_label: String,
    cancel_token: CancellationToken,
}

impl ConsoleApp {
    fn new(hospital_label: String, role_label: String) -> Self {
        Self {
            conversation: Conversation::new(),
            demo: None,
            input: String::new(),
            scroll_offset: 0,
            auto_scroll: true,
            hospital_label,
            role_label,
            cancel_token: CancellationToken::new(),
        }
    }

    fn build_display_lines(&self) -> Vec<Line<'_>> {
        let mut lines = Vec::new();

        for msg in self.conversation.messages() {
            match msg.role {
                TranscriptRole::User => {
                    lines.push(Line::from(vec![
                        Span::styled(
                            "You: ",
                            Style::default()
                                .fg(Color::Cyan)
                                .add_modifier(Modifier::BOLD),
                        ),
                        Span::styled(msg.content.as_str(), Style::default().fg(Color::Cyan)),
                    ]));
                }
                TranscriptRole::Alis => {
                    for content_line in msg.content.lines() {
                        lines.push(Line::from(Span::styled(
                            content_line,
                            Style::default().fg(Color::White),
                        )));
                    }
                    if !msg.actions.is_empty() {
                        let mut spans = Vec::new();
                        for (index, action) in msg.actions.iter().enumerate() {
                            let style = if action.primary {
                                Style::default()
                                    .fg(Color::Green)
                                    .add_modifier(Modifier::BOLD)
                            } else {
                                Style::default().fg(Color::Green)
                            };
                            spans.push(Span::styled(
                                format!("[{}] {}  ", index + 1, action.label),
                                style,
                            ));
                        }
                        lines.push(Line::from(spans));
                    }
                }
                TranscriptRole::AppError => {
                    lines.push(Line::from(Span::styled(
                        msg.content.as_str(),
                        Style::default().fg(Color::Red),
                    )));
                }
                TranscriptRole::AppInfo | TranscriptRole::AppWarning => {
                    lines.push(Line::from(Span::styled(
                        msg.content.as_str(),
                        Style::default().fg(Color::DarkGray),
                    )));
                }
            }
            lines.push(Line::from(""));
        }

        lines
    }

    fn max_scroll_offset(&self, available_height: u16) -> u16 {
        let total_lines = self.build_display_lines().len() as u16;
        total_lines.saturating_sub(available_height)
    }

    fn stick_to_bottom(&mut self, available_height: u16) {
        if self.auto_scroll {
            self.scroll_offset = self.max_scroll_offset(available_height);
        }
    }

    fn title(&self) -> String {
        let mode = match &self.demo {
            Some(script) => format!("demo:{}", script.scenario().as_str()),
            None => "live".to_string(),
        };
        let typing = if self.conversation.is_streaming() {
            "  ALIS is typing…"
        } else {
            ""
        };
        format!(
            "Virtualis — {} ({}) [{}]{}",
            self.hospital_label, self.role_label, mode, typing
        )
    }

    /// Action attached to the latest ALIS message, selected by its 1-based
    /// button index.
    fn action_at(&self, index: usize) -> Option<String> {
        self.conversation
            .messages()
            .iter()
            .rev()
            .find(|m| m.is_alis() && !m.actions.is_empty())
            .and_then(|m| m.actions.get(index))
            .map(|a| a.action.clone())
    }
}

fn ui(f: &mut Frame, app: &ConsoleApp) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(3)])
        .split(f.area());

    let lines = app.build_display_lines();
    let available_height = chunks[0].height.saturating_sub(1);
    let total_lines = lines.len() as u16;
    let max_offset = total_lines.saturating_sub(available_height);
    let scroll_offset = app.scroll_offset.min(max_offset);

    let messages_paragraph = Paragraph::new(lines)
        .block(Block::default().title(app.title()))
        .wrap(Wrap { trim: true })
        .scroll((scroll_offset, 0));
    f.render_widget(messages_paragraph, chunks[0]);

    let input_title = if app.conversation.is_streaming() {
        "Waiting for ALIS… (Esc to cancel)"
    } else if app.demo.is_some() {
        "Demo mode: press a button number, or Ctrl+D for live mode"
    } else {
        "Message ALIS (Enter to send, Ctrl+D for demo, Ctrl+C to quit)"
    };

    let input_style = if app.conversation.is_streaming() {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default().fg(Color::Yellow)
    };

    let input = Paragraph::new(app.input.as_str())
        .style(input_style)
        .block(Block::default().borders(Borders::ALL).title(input_title))
        .wrap(Wrap { trim: true });
    f.render_widget(input, chunks[1]);

    if !app.conversation.is_streaming() {
        f.set_cursor_position((chunks[1].x + app.input.len() as u16 + 1, chunks[1].y + 1));
    }
}

/// Spawn the scenario's canned steps onto a channel, honoring their
/// scripted delays, so playback never blocks the event loop.
fn play_demo_steps(steps: Vec<DemoStep>, tx: mpsc::UnboundedSender<DemoStep>) {
    tokio::spawn(async move {
        for step in steps {
            tokio::time::sleep(step.delay).await;
            if tx.send(step).is_err() {
                return;
            }
        }
    });
}

pub async fn run_console(
    context: SessionContext,
    config: Config,
    http: reqwest::Client,
    patient_context: Option<serde_json::Value>,
) -> Result<(), Box<dyn Error>> {
    let functions_url = config.resolve_functions_url()?;
    let access_token = context.session().access_token.clone();

    let audit = AuditLogger::new(Arc::new(FunctionsSink::new(
        http.clone(),
        functions_url.clone(),
        access_token.clone(),
    )));
    if let Some(patient_id) = context.selected_patient() {
        audit.record_view(
            "patient",
            Some(patient_id),
            Some(patient_id),
            context.selected_hospital(),
        );
    }

    let hospital_label = context
        .selected_hospital()
        .and_then(|id| {
            context
                .hospitals()
                .iter()
                .find(|h| h.id == id)
                .map(|h| h.name.clone())
        })
        .unwrap_or_else(|| "no hospital".to_string());
    let role_label = context.role().unwrap_or("unknown").to_string();

    let mut app = ConsoleApp::new(hospital_label, role_label);
    if config.demo.unwrap_or(false) {
        let scenario = config
            .default_scenario
            .as_deref()
            .and_then(DemoScenario::parse)
            .unwrap_or(DemoScenario::Day1);
        app.demo = Some(DemoScript::new(scenario));
    }

    let (stream_service, mut stream_rx) = ChatStreamService::new();
    let (demo_tx, mut demo_rx) = mpsc::unbounded_channel::<DemoStep>();

    if let Some(script) = &app.demo {
        play_demo_steps(script.opening(), demo_tx.clone());
    }

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    app.conversation.set_patient_context(patient_context);

    let result = console_loop(
        &mut terminal,
        &mut app,
        &context,
        &config,
        &http,
        &functions_url,
        &access_token,
        &stream_service,
        &mut stream_rx,
        &demo_tx,
        &mut demo_rx,
        &audit,
    )
    .await;

    // Flush before the terminal restores so the last view event of the
    // session is on its way out.
    audit.flush();

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

#[allow(clippy::too_many_arguments)]
async fn console_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut ConsoleApp,
    context: &SessionContext,
    config: &Config,
    http: &reqwest::Client,
    functions_url: &str,
    access_token: &str,
    stream_service: &ChatStreamService,
    stream_rx: &mut mpsc::UnboundedReceiver<(crate::core::chat_stream::StreamMessage, u64)>,
    demo_tx: &mpsc::UnboundedSender<DemoStep>,
    demo_rx: &mut mpsc::UnboundedReceiver<DemoStep>,
    audit: &AuditLogger,
) -> Result<(), Box<dyn Error>> {
    loop {
        terminal.draw(|f| ui(f, app))?;
        let terminal_height = terminal.size().map(|s| s.height).unwrap_or_default();
        let available_height = terminal_height.saturating_sub(4);

        if event::poll(Duration::from_millis(50))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => match key.code {
                    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        return Ok(());
                    }
                    KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        toggle_demo(app, config, demo_tx);
                    }
                    KeyCode::Esc => {
                        if app.conversation.is_streaming() {
                            // The cancelled task sends nothing further, so
                            // the turn is closed out locally as well.
                            app.cancel_token.cancel();
                            app.conversation.cancel_active_turn();
                        }
                    }
                    KeyCode::Enter => {
                        send_current_input(
                            app,
                            context,
                            http,
                            functions_url,
                            access_token,
                            stream_service,
                            audit,
                        );
                    }
                    KeyCode::Char(c) => {
                        if app.demo.is_some() {
                            if let Some(digit) = c.to_digit(10) {
                                if digit >= 1 {
                                    trigger_demo_action(app, digit as usize - 1, demo_tx);
                                    continue;
                                }
                            }
                        }
                        app.input.push(c);
                    }
                    KeyCode::Backspace => {
                        app.input.pop();
                    }
                    KeyCode::Up => {
                        app.auto_scroll = false;
                        app.scroll_offset = app.scroll_offset.saturating_sub(1);
                    }
                    KeyCode::Down => {
                        let max = app.max_scroll_offset(available_height);
                        app.scroll_offset = app.scroll_offset.saturating_add(1).min(max);
                        if app.scroll_offset >= max {
                            app.auto_scroll = true;
                        }
                    }
                    _ => {}
                },
                Event::Mouse(mouse) => match mouse.kind {
                    MouseEventKind::ScrollUp => {
                        app.auto_scroll = false;
                        app.scroll_offset = app.scroll_offset.saturating_sub(3);
                    }
                    MouseEventKind::ScrollDown => {
                        let max = app.max_scroll_offset(available_height);
                        app.scroll_offset = app.scroll_offset.saturating_add(3).min(max);
                        if app.scroll_offset >= max {
                            app.auto_scroll = true;
                        }
                    }
                    _ => {}
                },
                _ => {}
            }
        }

        let mut updated = false;
        while let Ok((message, stream_id)) = stream_rx.try_recv() {
            app.conversation.apply(message, stream_id);
            updated = true;
        }
        while let Ok(step) = demo_rx.try_recv() {
            match step.role {
                TranscriptRole::User => {
                    app.conversation.push_user(step.content);
                }
                _ => {
                    app.conversation.push_alis(step.content, step.actions);
                }
            }
            updated = true;
        }
        if updated {
            app.stick_to_bottom(available_height);
        }
    }
}

fn toggle_demo(app: &mut ConsoleApp, config: &Config, demo_tx: &mpsc::UnboundedSender<DemoStep>) {
    if app.demo.take().is_some() {
        app.conversation
            .push_notice(TranscriptRole::AppInfo, "Demo mode off — ALIS is live.");
    } else {
        let scenario = config
            .default_scenario
            .as_deref()
            .and_then(DemoScenario::parse)
            .unwrap_or(DemoScenario::Day1);
        let script = DemoScript::new(scenario);
        play_demo_steps(script.opening(), demo_tx.clone());
        app.demo = Some(script);
        app.conversation.push_notice(
            TranscriptRole::AppInfo,
            format!("Demo mode on — scenario {}.", scenario.as_str()),
        );
    }
}

fn trigger_demo_action(
    app: &mut ConsoleApp,
    action_index: usize,
    demo_tx: &mpsc::UnboundedSender<DemoStep>,
) {
    let Some(action) = app.action_at(action_index) else {
        return;
    };
    if let Some(script) = app.demo.as_mut() {
        let steps = script.advance(&action);
        if !steps.is_empty() {
            play_demo_steps(steps, demo_tx.clone());
        }
    }
}

fn send_current_input(
    app: &mut ConsoleApp,
    context: &SessionContext,
    http: &reqwest::Client,
    functions_url: &str,
    access_token: &str,
    stream_service: &ChatStreamService,
    audit: &AuditLogger,
) {
    let input_text = app.input.clone();

    if app.demo.is_some() {
        // Free-typed demo input just echoes into the transcript; the
        // scripted graph only advances through action buttons.
        if !input_text.trim().is_empty() {
            app.conversation.push_user(input_text.trim());
            app.input.clear();
        }
        return;
    }

    let Some(turn) = app.conversation.begin_turn(&input_text) else {
        return;
    };
    app.input.clear();
    app.auto_scroll = true;
    app.cancel_token = CancellationToken::new();

    audit.record_action(AuditEvent {
        action_type: "alis_message_sent".to_string(),
        resource_type: "alis_chat".to_string(),
        resource_id: None,
        patient_id: context.selected_patient().map(str::to_string),
        hospital_id: context.selected_hospital().map(str::to_string),
        metadata: None,
        session_id: None,
    });

    stream_service.spawn_stream(StreamParams {
        client: http.clone(),
        functions_url: functions_url.to_string(),
        access_token: access_token.to_string(),
        api_messages: turn.api_messages,
        patient_context: turn.patient_context,
        cancel_token: app.cancel_token.clone(),
        stream_id: turn.stream_id,
    });
}

