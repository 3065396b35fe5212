//! Application state management for the debtor console.
//!
//! This module contains the `App` struct that owns the session, the API
//! client and the inactivity monitor, plus all UI state and the channel that
//! background requests report back on.

use std::future::Future;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use deudores_core::models::export::{self, EXPORT_FILE_NAME};
use deudores_core::models::{parse_date, sort_debtors, Debtor, DebtorFilter, DebtorSortColumn, StatusCounts};
use deudores_core::{ApiClient, ApiError, Config, InactivityMonitor, InputEvent, MonitorAction, Session};

use crate::form::{parse_amount, DebtorForm};

// ============================================================================
// Constants
// ============================================================================

/// Buffer size for the background result channel.
const CHANNEL_BUFFER_SIZE: usize = 32;

/// Maximum length for username input.
const MAX_USERNAME_LENGTH: usize = 50;

/// Maximum length for password input.
const MAX_PASSWORD_LENGTH: usize = 128;

/// Maximum length for the payment amount input.
const MAX_AMOUNT_LENGTH: usize = 12;

/// Number of items to scroll on page up/down.
pub const PAGE_SCROLL_SIZE: usize = 10;

/// Maximum concurrent update requests when settling debtors.
const MAX_CONCURRENT_REQUESTS: usize = 4;

pub const SESSION_EXPIRED_MESSAGE: &str =
    "Tu sesión ha expirado. Por favor, inicia sesión nuevamente.";

pub const INACTIVITY_LOGOUT_MESSAGE: &str = "Sesión cerrada por inactividad.";

pub const SESSION_NOT_STORED_MESSAGE: &str =
    "No se pudo guardar la sesión; tendrás que iniciar sesión de nuevo al reiniciar.";

pub const SESSION_NOT_CLEARED_MESSAGE: &str =
    "No se pudo borrar la sesión guardada; se volverá a intentar al cerrar sesión.";

// ============================================================================
// UI State Types
// ============================================================================

/// Overall application state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Normal,
    Searching,
    EditingFilter(FilterField),
    ShowingHelp,
    ShowingHistory,
    LoggingIn,
    ConfirmingPresence,
    ConfirmingQuit,
    ConfirmingDelete,
    EnteringPayment,
    EditingDebtor,
    Quitting,
}

/// Filter values entered through a one-line prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    StartedBy,
    MinPending,
    MaxPending,
}

impl FilterField {
    pub fn label(&self) -> &'static str {
        match self {
            FilterField::StartedBy => "Iniciados hasta (AAAA-MM-DD)",
            FilterField::MinPending => "Pendiente mínimo",
            FilterField::MaxPending => "Pendiente máximo",
        }
    }
}

/// Login form focus state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoginFocus {
    Username,
    Password,
    Button,
}

// ============================================================================
// Background Task Results
// ============================================================================

/// Results sent back from background API requests.
#[derive(Debug)]
enum RequestResult {
    /// Full debtor list (with payment history)
    Debtors(Vec<Debtor>),
    /// A debtor was created or updated
    Saved(Debtor),
    /// A debtor was deleted
    Deleted(i64),
    /// Number of debtors marked as collected
    Settled(usize),
    /// A request failed (action label, error)
    Failed(&'static str, ApiError),
}

/// Result tagged with the session it belongs to
#[derive(Debug)]
struct Tagged {
    epoch: u64,
    result: RequestResult,
}

// ============================================================================
// Main Application Struct
// ============================================================================

pub struct App {
    // Core services
    pub config: Config,
    pub session: Session,
    pub api: ApiClient,
    pub monitor: Option<InactivityMonitor>,

    // UI State
    pub state: AppState,
    /// State to return to once the presence prompt is answered
    resume_state: AppState,
    pub filter: DebtorFilter,
    pub sort_column: DebtorSortColumn,
    pub sort_ascending: bool,
    pub selection: usize,
    pub history_selection: usize,
    pub payment_input: String,
    pub filter_input: String,
    pub form: DebtorForm,

    // Login form state
    pub login_username: String,
    pub login_password: String,
    pub login_focus: LoginFocus,
    pub login_error: Option<String>,

    // Data
    pub debtors: Vec<Debtor>,
    pub status_message: Option<String>,
    pub loading: bool,

    // Background requests
    result_tx: mpsc::Sender<Tagged>,
    result_rx: mpsc::Receiver<Tagged>,
    /// Bumped on every logout so late results from an old session are dropped
    session_epoch: u64,
}

impl App {
    /// Create a new application instance
    pub fn new() -> Result<Self> {
        let config = match Config::load() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Config::default()
            }
        }
        .with_env_overrides();
        debug!(api = %config.api_base_url, "Config loaded");

        let cache_dir = config.cache_dir().unwrap_or_else(|_| PathBuf::from("./cache"));

        let mut session = Session::new(config.token_store(cache_dir));
        if let Err(e) = session.load() {
            warn!(error = %e, "Failed to load stored session");
        }

        let mut api = ApiClient::new(&config.api_base_url)?;
        if let Some(token) = session.valid_token() {
            api.set_token(token.to_string());
        }

        let login_username = std::env::var("DEUDORES_USERNAME")
            .ok()
            .or_else(|| config.last_username.clone())
            .unwrap_or_default();
        let login_password = std::env::var("DEUDORES_PASSWORD").unwrap_or_default();

        Ok(Self::with_services(config, session, api, login_username, login_password))
    }

    fn with_services(
        config: Config,
        session: Session,
        api: ApiClient,
        login_username: String,
        login_password: String,
    ) -> Self {
        let (result_tx, result_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);

        Self {
            config,
            session,
            api,
            monitor: None,

            state: AppState::Normal,
            resume_state: AppState::Normal,
            filter: DebtorFilter::default(),
            sort_column: DebtorSortColumn::Name,
            sort_ascending: true,
            selection: 0,
            history_selection: 0,
            payment_input: String::new(),
            filter_input: String::new(),
            form: DebtorForm::default(),

            login_username,
            login_password,
            login_focus: LoginFocus::Username,
            login_error: None,

            debtors: Vec::new(),
            status_message: None,
            loading: false,

            result_tx,
            result_rx,
            session_epoch: 0,
        }
    }

    // =========================================================================
    // Session Lifecycle
    // =========================================================================

    /// Check if the user is authenticated with a valid session
    pub fn is_authenticated(&self) -> bool {
        self.session.is_valid()
    }

    /// Resume a restored session: start watching for inactivity and load data
    pub fn resume_session(&mut self, now: Instant) {
        self.mount_monitor(now);
        self.state = AppState::Normal;
        self.refresh();
    }

    fn mount_monitor(&mut self, now: Instant) {
        if let Some(mut old) = self.monitor.take() {
            old.teardown();
        }
        self.monitor = Some(InactivityMonitor::mount(self.config.monitor_config(), now));
    }

    /// Start the login process (show login overlay)
    pub fn start_login(&mut self) {
        self.state = AppState::LoggingIn;
        self.login_focus = if self.login_username.is_empty() {
            LoginFocus::Username
        } else {
            LoginFocus::Password
        };
    }

    /// Attempt login with the credentials from the login form
    pub async fn attempt_login(&mut self, now: Instant) -> Result<(), ApiError> {
        let username = self.login_username.trim().to_string();
        let password = self.login_password.clone();
        self.login_error = None;

        match self.api.login(&username, &password).await {
            Ok(token) => {
                self.config.last_username = Some(username.clone());
                if let Err(e) = self.config.save() {
                    warn!(error = %e, "Failed to save config");
                }
                self.install_session(&username, token, now);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Login failed");
                self.login_error = Some(e.login_message().to_string());
                Err(e)
            }
        }
    }

    /// Install a freshly issued token and open the debtor list.
    ///
    /// A token that cannot be persisted still opens the session for this run.
    fn install_session(&mut self, username: &str, token: String, now: Instant) {
        let stored = self.session.login(username, token.clone());
        self.api.set_token(token);
        self.login_password.clear();
        info!("Login successful");
        self.resume_session(now);

        if let Err(e) = stored {
            warn!(error = %e, "Failed to store session token");
            self.status_message = Some(SESSION_NOT_STORED_MESSAGE.to_string());
        }
    }

    /// End the session and return to the login screen.
    ///
    /// Every path that kicks the user out ends up here. Safe to call twice.
    pub fn logout(&mut self, reason: Option<&str>) {
        if let Some(mut monitor) = self.monitor.take() {
            monitor.teardown();
        }

        let mut login_error = reason.map(str::to_string);
        match self.session.logout() {
            Ok(true) => info!(reason = reason.unwrap_or("user request"), "Logged out"),
            Ok(false) => debug!("Logout with no active session"),
            Err(e) => {
                error!(error = %e, "Failed to clear stored session");
                login_error = Some(match login_error {
                    Some(reason) => format!("{} {}", reason, SESSION_NOT_CLEARED_MESSAGE),
                    None => SESSION_NOT_CLEARED_MESSAGE.to_string(),
                });
            }
        }

        self.api.clear_token();
        self.session_epoch += 1;
        self.debtors.clear();
        self.selection = 0;
        self.loading = false;
        self.payment_input.clear();
        self.status_message = None;
        self.login_error = login_error;
        self.start_login();
    }

    /// Feed a qualifying input event to the inactivity monitor
    pub fn record_input(&mut self, event: InputEvent, now: Instant) {
        let Some(monitor) = self.monitor.as_mut() else {
            return;
        };
        if monitor.record_activity(event, now) && self.state == AppState::ConfirmingPresence {
            self.state = self.resume_state;
        }
    }

    /// Explicit "continue session" from the presence prompt
    pub fn confirm_presence(&mut self, now: Instant) {
        if let Some(monitor) = self.monitor.as_mut() {
            if monitor.confirm_presence(now) {
                self.state = self.resume_state;
            }
        }
    }

    /// Explicit "log out" from any screen
    pub fn request_logout(&mut self) {
        if let Some(monitor) = self.monitor.as_mut() {
            monitor.request_logout();
        }
        self.logout(None);
    }

    /// Advance timers and check token expiry. Called every loop iteration.
    pub fn tick(&mut self, now: Instant) {
        let Some(monitor) = self.monitor.as_mut() else {
            return;
        };

        match monitor.poll(now) {
            Some(MonitorAction::PromptPresence) => {
                if self.state != AppState::ConfirmingPresence {
                    self.resume_state = self.state;
                }
                self.state = AppState::ConfirmingPresence;
            }
            Some(MonitorAction::Logout) => {
                self.logout(Some(INACTIVITY_LOGOUT_MESSAGE));
                return;
            }
            None => {}
        }

        if !self.session.is_valid() {
            info!("Session token expired");
            self.logout(Some(SESSION_EXPIRED_MESSAGE));
        }
    }

    /// Tear everything down on exit
    pub fn shutdown(&mut self) {
        if let Some(mut monitor) = self.monitor.take() {
            monitor.teardown();
        }
    }

    // =========================================================================
    // Background Requests
    // =========================================================================

    /// Run an authenticated request in the background.
    ///
    /// The session is checked first; an expired token logs out instead.
    fn spawn_request<F>(&mut self, action: &'static str, request: F)
    where
        F: Future<Output = Result<RequestResult, ApiError>> + Send + 'static,
    {
        if !self.session.is_valid() {
            self.logout(Some(SESSION_EXPIRED_MESSAGE));
            return;
        }

        self.loading = true;
        let tx = self.result_tx.clone();
        let epoch = self.session_epoch;

        tokio::spawn(async move {
            let result = match request.await {
                Ok(result) => result,
                Err(e) => RequestResult::Failed(action, e),
            };
            if tx.send(Tagged { epoch, result }).await.is_err() {
                debug!("Result channel closed");
            }
        });
    }

    /// Reload the debtor list (with payment history)
    pub fn refresh(&mut self) {
        let api = self.api.clone();
        self.status_message = Some("Cargando deudores...".to_string());
        self.spawn_request("Error al obtener los deudores", async move {
            let debtors = match api.fetch_history().await {
                // Older backends only expose the plain list
                Err(ApiError::NotFound(_)) => api.fetch_debtors().await?,
                other => other?,
            };
            Ok::<_, ApiError>(RequestResult::Debtors(debtors))
        });
    }

    /// Check for completed background requests and process results
    pub fn check_background_tasks(&mut self) {
        let mut results = Vec::new();
        while let Ok(tagged) = self.result_rx.try_recv() {
            results.push(tagged);
        }

        for tagged in results {
            if tagged.epoch != self.session_epoch {
                debug!("Dropping result from a previous session");
                continue;
            }
            self.process_result(tagged.result);
        }
    }

    fn process_result(&mut self, result: RequestResult) {
        self.loading = false;
        match result {
            RequestResult::Debtors(debtors) => {
                info!(count = debtors.len(), "Debtors loaded");
                self.status_message = Some(format!("{} deudores cargados", debtors.len()));
                self.debtors = debtors;
                self.clamp_selection();
            }
            RequestResult::Saved(debtor) => {
                self.status_message = Some(format!("Deudor guardado: {}", debtor.name));
                match self.debtors.iter_mut().find(|d| d.id.is_some() && d.id == debtor.id) {
                    Some(existing) => *existing = debtor,
                    None => self.debtors.push(debtor),
                }
            }
            RequestResult::Deleted(id) => {
                self.debtors.retain(|d| d.id != Some(id));
                self.status_message = Some("Deudor eliminado".to_string());
                self.clamp_selection();
            }
            RequestResult::Settled(count) => {
                self.status_message = Some(format!("{} deudores marcados como cobrados", count));
                self.refresh();
            }
            RequestResult::Failed(action, e) if e.is_auth_failure() => {
                warn!(action = action, error = %e, "Request rejected, session is no longer valid");
                self.logout(Some(SESSION_EXPIRED_MESSAGE));
            }
            RequestResult::Failed(action, e) => {
                error!(action = action, error = %e, "Request failed");
                self.status_message = Some(format!("{}: {}", action, e));
            }
        }
    }

    // =========================================================================
    // Debtor Actions
    // =========================================================================

    pub fn begin_payment(&mut self) {
        if self.selected_debtor().and_then(|d| d.id).is_some() {
            self.payment_input.clear();
            self.state = AppState::EnteringPayment;
        }
    }

    pub fn push_payment_char(&mut self, c: char) {
        if self.payment_input.len() < MAX_AMOUNT_LENGTH && (c.is_ascii_digit() || c == '.' || c == ',') {
            self.payment_input.push(c);
        }
    }

    /// Record an installment for the selected debtor
    pub fn submit_payment(&mut self) {
        let Some(id) = self.selected_debtor().and_then(|d| d.id) else {
            self.state = AppState::Normal;
            return;
        };

        match parse_amount(&self.payment_input).filter(|amount| *amount > 0.0) {
            Some(amount) => {
                self.state = AppState::Normal;
                let api = self.api.clone();
                self.spawn_request("Error al registrar el pago", async move {
                    api.pay_installment(id, amount).await.map(RequestResult::Saved)
                });
            }
            None => {
                self.status_message = Some("Monto inválido".to_string());
            }
        }
    }

    pub fn begin_delete(&mut self) {
        if self.selected_debtor().and_then(|d| d.id).is_some() {
            self.state = AppState::ConfirmingDelete;
        }
    }

    pub fn confirm_delete(&mut self) {
        self.state = AppState::Normal;
        let Some(id) = self.selected_debtor().and_then(|d| d.id) else {
            return;
        };
        let api = self.api.clone();
        self.spawn_request("Error al eliminar el deudor", async move {
            api.delete_debtor(id).await.map(|_| RequestResult::Deleted(id))
        });
    }

    /// Flip the collected flag of the selected debtor
    pub fn toggle_collected(&mut self) {
        let Some(mut debtor) = self.selected_debtor().cloned() else {
            return;
        };
        let Some(id) = debtor.id else {
            return;
        };
        debtor.collected = !debtor.collected;
        let api = self.api.clone();
        self.spawn_request("Error al actualizar el deudor", async move {
            api.update_debtor(id, &debtor).await.map(RequestResult::Saved)
        });
    }

    /// Mark every fully paid, not yet collected debtor as collected
    pub fn settle_paid_debtors(&mut self) {
        let pending: Vec<Debtor> = self
            .debtors
            .iter()
            .filter(|d| d.id.is_some() && !d.is_active() && !d.collected)
            .map(|d| Debtor {
                collected: true,
                ..d.clone()
            })
            .collect();

        if pending.is_empty() {
            self.status_message = Some("No hay deudores saldados por cobrar".to_string());
            return;
        }

        let api = self.api.clone();
        self.spawn_request("Error al marcar cobrados", async move {
            let results: Vec<Result<Debtor, ApiError>> = stream::iter(pending)
                .map(|debtor| {
                    let api = api.clone();
                    async move {
                        let id = debtor.id.unwrap_or_default();
                        api.update_debtor(id, &debtor).await
                    }
                })
                .buffer_unordered(MAX_CONCURRENT_REQUESTS)
                .collect()
                .await;

            let mut settled = 0;
            for result in results {
                match result {
                    Ok(_) => settled += 1,
                    Err(e) if e.is_auth_failure() => return Err(e),
                    Err(e) => warn!(error = %e, "Failed to mark debtor as collected"),
                }
            }
            Ok::<_, ApiError>(RequestResult::Settled(settled))
        });
    }

    pub fn begin_new_debtor(&mut self) {
        self.form = DebtorForm::default();
        self.state = AppState::EditingDebtor;
    }

    pub fn submit_form(&mut self) {
        match self.form.to_debtor() {
            Ok(debtor) => {
                self.state = AppState::Normal;
                let api = self.api.clone();
                self.spawn_request("Error al guardar el deudor", async move {
                    api.create_debtor(&debtor).await.map(RequestResult::Saved)
                });
            }
            Err(message) => self.form.error = Some(message),
        }
    }

    pub fn show_history(&mut self) {
        if self.selected_debtor().is_some() {
            self.history_selection = 0;
            self.state = AppState::ShowingHistory;
        }
    }

    /// Write the visible (filtered, sorted) list to a CSV file
    pub fn export_csv(&mut self) {
        let path = std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(EXPORT_FILE_NAME);
        let visible = self.visible_debtors();
        match export::write_csv(&path, &visible) {
            Ok(()) => {
                info!(path = %path.display(), rows = visible.len(), "Exported CSV");
                self.status_message = Some(format!("Exportado a {}", path.display()));
            }
            Err(e) => {
                error!(error = %e, "CSV export failed");
                self.status_message = Some(format!("Error al exportar: {}", e));
            }
        }
    }

    // =========================================================================
    // List Views
    // =========================================================================

    /// Debtors after the current filter and sort
    pub fn visible_debtors(&self) -> Vec<&Debtor> {
        let mut visible = self.filter.apply(&self.debtors);
        sort_debtors(&mut visible, self.sort_column, self.sort_ascending);
        visible
    }

    pub fn selected_debtor(&self) -> Option<&Debtor> {
        self.visible_debtors().get(self.selection).copied()
    }

    pub fn status_counts(&self) -> StatusCounts {
        StatusCounts::from_debtors(&self.debtors)
    }

    fn clamp_selection(&mut self) {
        let len = self.visible_debtors().len();
        self.selection = self.selection.min(len.saturating_sub(1));
    }

    /// Toggle sort column - if already sorting by this column, flip direction;
    /// otherwise switch to this column with ascending=true. Resets selection to 0.
    pub fn toggle_sort(&mut self, column: DebtorSortColumn) {
        if self.sort_column == column {
            self.sort_ascending = !self.sort_ascending;
        } else {
            self.sort_column = column;
            self.sort_ascending = true;
        }
        self.selection = 0;
    }

    pub fn cycle_status_filter(&mut self) {
        self.filter.status = self.filter.status.next();
        self.selection = 0;
    }

    pub fn begin_filter(&mut self, field: FilterField) {
        self.filter_input = match field {
            FilterField::StartedBy => self
                .filter
                .started_by
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            FilterField::MinPending if self.filter.min_pending > 0.0 => self.filter.min_pending.to_string(),
            FilterField::MinPending => String::new(),
            FilterField::MaxPending => self.filter.max_pending.map(|v| v.to_string()).unwrap_or_default(),
        };
        self.state = AppState::EditingFilter(field);
    }

    /// Apply the prompt value. An empty value removes that filter.
    pub fn apply_filter_input(&mut self, field: FilterField) {
        let input = self.filter_input.trim();
        let applied = match field {
            FilterField::StartedBy if input.is_empty() => {
                self.filter.started_by = None;
                true
            }
            FilterField::StartedBy => parse_date(input)
                .map(|d| self.filter.started_by = Some(d))
                .is_some(),
            FilterField::MinPending if input.is_empty() => {
                self.filter.min_pending = 0.0;
                true
            }
            FilterField::MinPending => parse_amount(input).map(|v| self.filter.min_pending = v).is_some(),
            FilterField::MaxPending if input.is_empty() => {
                self.filter.max_pending = None;
                true
            }
            FilterField::MaxPending => parse_amount(input)
                .map(|v| self.filter.max_pending = Some(v))
                .is_some(),
        };

        if applied {
            self.state = AppState::Normal;
            self.selection = 0;
        } else {
            self.status_message = Some(format!("Valor inválido para: {}", field.label()));
        }
    }

    pub fn clear_filters(&mut self) {
        self.filter = DebtorFilter::default();
        self.selection = 0;
    }

    pub fn select_next(&mut self, step: usize) {
        let max_index = self.visible_debtors().len().saturating_sub(1);
        self.selection = (self.selection + step).min(max_index);
    }

    pub fn select_prev(&mut self, step: usize) {
        self.selection = self.selection.saturating_sub(step);
    }
}

// ============================================================================
// Input validation helpers (exported for use in input.rs)
// ============================================================================

/// Check if a character is valid for input (no control characters)
fn is_valid_input_char(c: char) -> bool {
    !c.is_control()
}

/// Check if a username character should be accepted
pub fn can_add_username_char(current_len: usize, c: char) -> bool {
    current_len < MAX_USERNAME_LENGTH && is_valid_input_char(c)
}

/// Check if a password character should be accepted
pub fn can_add_password_char(current_len: usize, c: char) -> bool {
    current_len < MAX_PASSWORD_LENGTH && is_valid_input_char(c)
}

// ============================================================================
// Tests
// ============================================================================
