//! Gestión de Deudores - a keyboard-driven terminal console for tracking
//! debtors and their installment payments.
//!
//! Idle sessions are challenged and then logged out by the inactivity
//! monitor; expired tokens send the user back to the login screen.

mod app;
mod form;
mod ui;

use std::io;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers,
        MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::{App, AppState};
use deudores_core::{Config, InputEvent};
use ui::input::handle_input;
use ui::render::render;

// ============================================================================
// Constants
// ============================================================================

/// Timeout for polling terminal events (in milliseconds)
const EVENT_POLL_TIMEOUT_MS: u64 = 100;

const LOG_FILE_PREFIX: &str = "deudores.log";

/// Initialize the tracing subscriber.
///
/// Logs go to a daily file in the cache directory since stderr would draw
/// over the terminal UI. Use RUST_LOG to control the level (e.g. RUST_LOG=debug).
fn init_tracing(log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log directory {}", log_dir.display()))?;

    let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(filter)
        .init();

    Ok(guard)
}

/// Raw mode, alternate screen and mouse capture for as long as it lives
struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> Result<Self> {
        enable_raw_mode()?;
        execute!(io::stdout(), EnterAlternateScreen, EnableMouseCapture)?;
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if let Err(e) = disable_raw_mode() {
            warn!(error = %e, "Failed to disable raw mode");
        }
        if let Err(e) = execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture) {
            warn!(error = %e, "Failed to restore terminal");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let log_dir = Config::default().cache_dir()?;
    let _log_guard = init_tracing(&log_dir)?;

    let mut app = App::new()?;
    info!(api = %app.config.api_base_url, "Debtor console starting");

    if app.is_authenticated() {
        app.resume_session(Instant::now());
    } else {
        app.start_login();
    }

    let result = {
        let _terminal_guard = TerminalGuard::enter()?;
        let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
        let result = run_app(&mut terminal, &mut app).await;
        terminal.show_cursor()?;
        result
    };

    app.shutdown();

    if let Err(ref e) = result {
        eprintln!("Error: {}", e);
    }

    info!("Debtor console shutting down");
    result
}

/// Map a terminal event to the activity it represents, if any
fn activity_for(event: &Event) -> Option<InputEvent> {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => Some(InputEvent::KeyDown),
        Event::Mouse(mouse) => match mouse.kind {
            MouseEventKind::Moved | MouseEventKind::Drag(_) | MouseEventKind::ScrollDown | MouseEventKind::ScrollUp => {
                Some(InputEvent::PointerMove)
            }
            MouseEventKind::Down(_) => Some(InputEvent::Click),
            _ => None,
        },
        _ => None,
    }
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> Result<()> {
    loop {
        terminal.draw(|f| render(f, app))?;

        // Poll with a timeout so timers and background results keep moving
        if event::poll(Duration::from_millis(EVENT_POLL_TIMEOUT_MS))? {
            let event = event::read()?;

            if let Event::Key(key) = &event {
                let key = *key;
                if key.kind == KeyEventKind::Press {
                    // Ctrl+C to quit
                    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                        return Ok(());
                    }

                    if handle_input(app, key).await? {
                        return Ok(());
                    }
                }
            }

            if let Some(activity) = activity_for(&event) {
                app.record_input(activity, Instant::now());
            }
        }

        app.tick(Instant::now());
        app.check_background_tasks();

        if matches!(app.state, AppState::Quitting) {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyEvent, MouseButton, MouseEvent};

    fn mouse(kind: MouseEventKind) -> Event {
        Event::Mouse(MouseEvent {
            kind,
            column: 0,
            row: 0,
            modifiers: KeyModifiers::NONE,
        })
    }

    #[test]
    fn test_activity_mapping() {
        let key = Event::Key(KeyEvent::new(KeyCode::Char('a'), KeyModifiers::NONE));
        assert_eq!(activity_for(&key), Some(InputEvent::KeyDown));
        assert_eq!(activity_for(&mouse(MouseEventKind::Moved)), Some(InputEvent::PointerMove));
        assert_eq!(
            activity_for(&mouse(MouseEventKind::Down(MouseButton::Left))),
            Some(InputEvent::Click)
        );
        assert_eq!(activity_for(&mouse(MouseEventKind::Up(MouseButton::Left))), None);
        assert_eq!(activity_for(&Event::FocusGained), None);
    }
}
