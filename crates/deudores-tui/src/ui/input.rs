//! Keyboard input handling for the TUI.
//!
//! Every key is first routed by the current overlay; only `Normal` reaches
//! the global bindings.

use std::time::Instant;

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent};

use deudores_core::models::DebtorSortColumn;

use crate::app::{
    can_add_password_char, can_add_username_char, App, AppState, FilterField, LoginFocus,
    PAGE_SCROLL_SIZE,
};

/// Maximum length of a filter prompt value
const MAX_FILTER_INPUT_LENGTH: usize = 20;

/// Handle keyboard input. Returns true if the app should quit.
pub async fn handle_input(app: &mut App, key: KeyEvent) -> Result<bool> {
    match app.state {
        AppState::LoggingIn => return handle_login_input(app, key).await,
        AppState::ConfirmingPresence => handle_presence_input(app, key),
        AppState::ShowingHelp => {
            if matches!(key.code, KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q')) {
                app.state = AppState::Normal;
            }
        }
        AppState::ShowingHistory => handle_history_input(app, key),
        AppState::ConfirmingQuit => {
            if is_yes(key.code) {
                app.state = AppState::Quitting;
                return Ok(true);
            }
            if is_no(key.code) {
                app.state = AppState::Normal;
            }
        }
        AppState::ConfirmingDelete => {
            if is_yes(key.code) {
                app.confirm_delete();
            } else if is_no(key.code) {
                app.state = AppState::Normal;
            }
        }
        AppState::EnteringPayment => match key.code {
            KeyCode::Esc => app.state = AppState::Normal,
            KeyCode::Enter => app.submit_payment(),
            KeyCode::Backspace => {
                app.payment_input.pop();
            }
            KeyCode::Char(c) => app.push_payment_char(c),
            _ => {}
        },
        AppState::EditingFilter(field) => handle_filter_input(app, field, key),
        AppState::EditingDebtor => handle_form_input(app, key),
        AppState::Searching => handle_search_input(app, key),
        AppState::Normal => return handle_normal_input(app, key),
        AppState::Quitting => return Ok(true),
    }
    Ok(false)
}

fn is_yes(code: KeyCode) -> bool {
    matches!(
        code,
        KeyCode::Char('s') | KeyCode::Char('S') | KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter
    )
}

fn is_no(code: KeyCode) -> bool {
    matches!(code, KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc)
}

fn handle_normal_input(app: &mut App, key: KeyEvent) -> Result<bool> {
    match key.code {
        KeyCode::Char('q') => app.state = AppState::ConfirmingQuit,
        KeyCode::Char('?') => app.state = AppState::ShowingHelp,
        KeyCode::Char('L') => app.request_logout(),
        KeyCode::Char('u') => app.refresh(),

        // Filters
        KeyCode::Char('/') => {
            app.filter.name.clear();
            app.state = AppState::Searching;
        }
        KeyCode::Char('s') => app.cycle_status_filter(),
        KeyCode::Char('d') => app.begin_filter(FilterField::StartedBy),
        KeyCode::Char('<') => app.begin_filter(FilterField::MinPending),
        KeyCode::Char('>') => app.begin_filter(FilterField::MaxPending),
        KeyCode::Char('c') => app.clear_filters(),
        KeyCode::Esc => {
            app.filter.name.clear();
            app.selection = 0;
        }

        // Sorting
        KeyCode::Char('n') => app.toggle_sort(DebtorSortColumn::Name),
        KeyCode::Char('p') => app.toggle_sort(DebtorSortColumn::Pending),
        KeyCode::Char('i') => app.toggle_sort(DebtorSortColumn::StartDate),
        KeyCode::Char('x') => app.toggle_sort(DebtorSortColumn::NextPayment),

        // Navigation
        KeyCode::Down | KeyCode::Char('j') => app.select_next(1),
        KeyCode::Up | KeyCode::Char('k') => app.select_prev(1),
        KeyCode::PageDown => app.select_next(PAGE_SCROLL_SIZE),
        KeyCode::PageUp => app.select_prev(PAGE_SCROLL_SIZE),
        KeyCode::Home => app.selection = 0,
        KeyCode::End => app.select_next(app.debtors.len()),

        // Actions
        KeyCode::Enter | KeyCode::Char('h') => app.show_history(),
        KeyCode::Char('a') => app.begin_new_debtor(),
        KeyCode::Char('$') => app.begin_payment(),
        KeyCode::Char('m') => app.toggle_collected(),
        KeyCode::Char('M') => app.settle_paid_debtors(),
        KeyCode::Delete => app.begin_delete(),
        KeyCode::Char('e') => app.export_csv(),
        _ => {}
    }
    Ok(false)
}

fn handle_presence_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('L') | KeyCode::Char('l') => app.request_logout(),
        KeyCode::Enter | KeyCode::Char('c') => app.confirm_presence(Instant::now()),
        // Any other key still counts as activity once it reaches the monitor
        _ => {}
    }
}

fn handle_history_input(app: &mut App, key: KeyEvent) {
    let count = app.selected_debtor().map(|d| d.payments.len()).unwrap_or(0);
    match key.code {
        KeyCode::Esc | KeyCode::Char('h') | KeyCode::Char('q') => app.state = AppState::Normal,
        KeyCode::Down | KeyCode::Char('j') => {
            app.history_selection = (app.history_selection + 1).min(count.saturating_sub(1));
        }
        KeyCode::Up | KeyCode::Char('k') => {
            app.history_selection = app.history_selection.saturating_sub(1);
        }
        _ => {}
    }
}

fn handle_search_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.state = AppState::Normal;
            app.filter.name.clear();
        }
        KeyCode::Enter => {
            app.state = AppState::Normal;
        }
        KeyCode::Backspace => {
            app.filter.name.pop();
        }
        KeyCode::Char(c) if !c.is_control() => {
            app.filter.name.push(c);
            app.selection = 0;
        }
        _ => {}
    }
}

fn handle_filter_input(app: &mut App, field: FilterField, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.state = AppState::Normal,
        KeyCode::Enter => app.apply_filter_input(field),
        KeyCode::Backspace => {
            app.filter_input.pop();
        }
        KeyCode::Char(c) if !c.is_control() && app.filter_input.len() < MAX_FILTER_INPUT_LENGTH => {
            app.filter_input.push(c);
        }
        _ => {}
    }
}

fn handle_form_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.state = AppState::Normal,
        KeyCode::Enter => app.submit_form(),
        KeyCode::Tab | KeyCode::Down => app.form.next_field(),
        KeyCode::BackTab | KeyCode::Up => app.form.prev_field(),
        KeyCode::Backspace => app.form.pop(),
        KeyCode::Char(c) => app.form.push(c),
        _ => {}
    }
}

async fn handle_login_input(app: &mut App, key: KeyEvent) -> Result<bool> {
    match key.code {
        KeyCode::Esc => {
            // Quit if on login screen
            app.state = AppState::Quitting;
            return Ok(true);
        }
        KeyCode::Down | KeyCode::Tab => {
            app.login_focus = match app.login_focus {
                LoginFocus::Username => LoginFocus::Password,
                LoginFocus::Password => LoginFocus::Button,
                LoginFocus::Button => LoginFocus::Username,
            };
        }
        KeyCode::Up | KeyCode::BackTab => {
            app.login_focus = match app.login_focus {
                LoginFocus::Username => LoginFocus::Button,
                LoginFocus::Password => LoginFocus::Username,
                LoginFocus::Button => LoginFocus::Password,
            };
        }
        KeyCode::Enter => match app.login_focus {
            LoginFocus::Username => app.login_focus = LoginFocus::Password,
            LoginFocus::Password | LoginFocus::Button => {
                // On failure login_error is set and the overlay stays up
                let _ = app.attempt_login(Instant::now()).await;
            }
        },
        KeyCode::Backspace => match app.login_focus {
            LoginFocus::Username => {
                app.login_username.pop();
            }
            LoginFocus::Password => {
                app.login_password.pop();
            }
            LoginFocus::Button => {}
        },
        KeyCode::Char(c) => match app.login_focus {
            LoginFocus::Username => {
                if can_add_username_char(app.login_username.len(), c) {
                    app.login_username.push(c);
                }
            }
            LoginFocus::Password => {
                if can_add_password_char(app.login_password.len(), c) {
                    app.login_password.push(c);
                }
            }
            LoginFocus::Button => {}
        },
        _ => {}
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyModifiers;

    use crate::app::tests::{app_with_token, debtor, logged_in_app};
    use deudores_core::monitor::INACTIVITY_TIMEOUT;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    async fn press(app: &mut App, code: KeyCode) -> bool {
        handle_input(app, key(code)).await.unwrap()
    }

    #[tokio::test]
    async fn test_quit_requires_confirmation() {
        let mut app = app_with_token(None);
        app.state = AppState::Normal;

        assert!(!press(&mut app, KeyCode::Char('q')).await);
        assert_eq!(app.state, AppState::ConfirmingQuit);
        assert!(!press(&mut app, KeyCode::Char('n')).await);
        assert_eq!(app.state, AppState::Normal);

        press(&mut app, KeyCode::Char('q')).await;
        assert!(press(&mut app, KeyCode::Char('s')).await);
        assert_eq!(app.state, AppState::Quitting);
    }

    #[tokio::test]
    async fn test_search_edits_name_filter() {
        let mut app = app_with_token(None);
        app.state = AppState::Normal;
        app.debtors = vec![debtor(1, "Ana", 1.0), debtor(2, "Beto", 1.0)];

        press(&mut app, KeyCode::Char('/')).await;
        for c in "be".chars() {
            press(&mut app, KeyCode::Char(c)).await;
        }
        press(&mut app, KeyCode::Enter).await;

        assert_eq!(app.state, AppState::Normal);
        assert_eq!(app.filter.name, "be");
        assert_eq!(app.visible_debtors().len(), 1);

        press(&mut app, KeyCode::Esc).await;
        assert!(app.filter.name.is_empty());
    }

    #[tokio::test]
    async fn test_login_field_navigation() {
        let mut app = app_with_token(None);
        app.start_login();
        assert_eq!(app.login_focus, LoginFocus::Username);

        press(&mut app, KeyCode::Char('a')).await;
        press(&mut app, KeyCode::Tab).await;
        press(&mut app, KeyCode::Char('x')).await;
        press(&mut app, KeyCode::BackTab).await;
        press(&mut app, KeyCode::Backspace).await;

        assert_eq!(app.login_username, "");
        assert_eq!(app.login_password, "x");
        assert_eq!(app.login_focus, LoginFocus::Username);
    }

    #[tokio::test]
    async fn test_login_with_empty_fields_shows_error() {
        let mut app = app_with_token(None);
        app.start_login();
        app.login_focus = LoginFocus::Button;

        assert!(!press(&mut app, KeyCode::Enter).await);
        assert_eq!(app.state, AppState::LoggingIn);
        assert_eq!(
            app.login_error.as_deref(),
            Some("Por favor, completa todos los campos.")
        );
    }

    #[tokio::test]
    async fn test_logout_from_presence_prompt() {
        let start = Instant::now();
        let mut app = logged_in_app(start);
        app.tick(start + INACTIVITY_TIMEOUT);
        assert_eq!(app.state, AppState::ConfirmingPresence);

        press(&mut app, KeyCode::Char('L')).await;
        assert_eq!(app.state, AppState::LoggingIn);
        assert!(app.session.token().is_none());
    }

    #[tokio::test]
    async fn test_filter_prompt_via_keys() {
        let mut app = app_with_token(None);
        app.state = AppState::Normal;

        press(&mut app, KeyCode::Char('<')).await;
        assert_eq!(app.state, AppState::EditingFilter(FilterField::MinPending));
        for c in "250".chars() {
            press(&mut app, KeyCode::Char(c)).await;
        }
        press(&mut app, KeyCode::Enter).await;

        assert_eq!(app.state, AppState::Normal);
        assert_eq!(app.filter.min_pending, 250.0);
    }

    #[tokio::test]
    async fn test_sort_keys_toggle_direction() {
        let mut app = app_with_token(None);
        app.state = AppState::Normal;

        press(&mut app, KeyCode::Char('p')).await;
        assert_eq!(app.sort_column, DebtorSortColumn::Pending);
        assert!(app.sort_ascending);
        press(&mut app, KeyCode::Char('p')).await;
        assert!(!app.sort_ascending);
    }
}
