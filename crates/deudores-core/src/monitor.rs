//! Inactivity monitor.
//!
//! A cooperative state machine polled by the host's event loop. It watches
//! input events and, after a quiet period, asks the user to confirm they are
//! still there before requesting a logout.
//!
//! ```text
//!            input / continue
//!        ┌──────────────────────┐
//!        ▼                      │
//!     Active ──T1──▶ PendingConfirmation ──T2──▶ LoggedOut
//!      │  ▲                                        ▲
//!      └──┘ input                                  │
//!      any state ─────────── log out ──────────────┘
//! ```
//!
//! Time is always passed in by the caller, so tests drive it with virtual
//! instants.

use std::time::{Duration, Instant};

use tracing::{debug, info};

/// Quiet period before the user is challenged.
pub const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Time the user has to answer the challenge.
pub const GRACE_PERIOD: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Active,
    PendingConfirmation,
    LoggedOut,
}

/// Input events that count as user presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    PointerMove,
    KeyDown,
    Click,
}

/// What the host must do after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorAction {
    /// Show the "are you still there?" prompt
    PromptPresence,
    /// End the session and return to the login screen
    Logout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    pub inactivity_timeout: Duration,
    pub grace_period: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout: INACTIVITY_TIMEOUT,
            grace_period: GRACE_PERIOD,
        }
    }
}

/// A single owned one-shot timer.
#[derive(Debug, Default)]
struct Timer {
    deadline: Option<Instant>,
}

impl Timer {
    /// Re-arming replaces any previous deadline. A deadline past what
    /// `Instant` can represent leaves the timer disarmed.
    fn arm(&mut self, now: Instant, after: Duration) {
        self.deadline = now.checked_add(after);
    }

    fn cancel(&mut self) {
        self.deadline = None;
    }

    #[cfg(test)]
    fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    fn has_fired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline.map(|deadline| deadline.saturating_duration_since(now))
    }
}

pub struct InactivityMonitor {
    config: MonitorConfig,
    phase: Phase,
    last_activity_at: Instant,
    /// T1: armed only while `Active`
    inactivity: Timer,
    /// T2: armed only while `PendingConfirmation`
    grace: Timer,
    mounted: bool,
}

impl InactivityMonitor {
    /// Start watching: enter `Active` and arm the inactivity timer.
    pub fn mount(config: MonitorConfig, now: Instant) -> Self {
        let mut monitor = Self {
            config,
            phase: Phase::Active,
            last_activity_at: now,
            inactivity: Timer::default(),
            grace: Timer::default(),
            mounted: true,
        };
        monitor.reset(now);
        debug!(timeout_secs = config.inactivity_timeout.as_secs(), "Inactivity monitor mounted");
        monitor
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn last_activity_at(&self) -> Instant {
        self.last_activity_at
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn config(&self) -> MonitorConfig {
        self.config
    }

    /// Record a qualifying input event.
    ///
    /// In `Active` or `PendingConfirmation` this cancels every pending timer
    /// and restarts the full inactivity timeout. Returns whether a reset
    /// happened.
    pub fn record_activity(&mut self, event: InputEvent, now: Instant) -> bool {
        if !self.mounted || self.phase == Phase::LoggedOut {
            return false;
        }

        if self.phase == Phase::PendingConfirmation {
            debug!(?event, "Activity cancelled pending logout");
        }
        self.last_activity_at = now;
        self.reset(now);
        true
    }

    /// Explicit "continue session" from the presence prompt.
    pub fn confirm_presence(&mut self, now: Instant) -> bool {
        if !self.mounted || self.phase != Phase::PendingConfirmation {
            return false;
        }

        info!("User confirmed presence");
        self.last_activity_at = now;
        self.reset(now);
        true
    }

    /// Explicit "log out" from any state.
    ///
    /// Returns `Logout` unless the monitor already logged out or was torn down.
    pub fn request_logout(&mut self) -> Option<MonitorAction> {
        if !self.mounted || self.phase == Phase::LoggedOut {
            return None;
        }

        info!("User requested logout");
        self.enter_logged_out();
        Some(MonitorAction::Logout)
    }

    /// Fire whichever timer is due. At most one transition per poll.
    pub fn poll(&mut self, now: Instant) -> Option<MonitorAction> {
        if !self.mounted {
            return None;
        }

        match self.phase {
            Phase::Active if self.inactivity.has_fired(now) => {
                self.inactivity.cancel();
                self.phase = Phase::PendingConfirmation;
                self.grace.arm(now, self.config.grace_period);
                info!(
                    grace_secs = self.config.grace_period.as_secs(),
                    "Inactivity timeout reached, asking for confirmation"
                );
                Some(MonitorAction::PromptPresence)
            }
            Phase::PendingConfirmation if self.grace.has_fired(now) => {
                info!("Presence not confirmed, logging out");
                self.enter_logged_out();
                Some(MonitorAction::Logout)
            }
            _ => None,
        }
    }

    /// Time left on whichever timer is armed
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        match self.phase {
            Phase::Active => self.inactivity.remaining(now),
            Phase::PendingConfirmation => self.grace.remaining(now),
            Phase::LoggedOut => None,
        }
    }

    /// Cancel all timers and stop reacting. Later events and polls are no-ops.
    pub fn teardown(&mut self) {
        if !self.mounted {
            return;
        }
        self.inactivity.cancel();
        self.grace.cancel();
        self.mounted = false;
        debug!("Inactivity monitor torn down");
    }

    fn reset(&mut self, now: Instant) {
        self.inactivity.cancel();
        self.grace.cancel();
        self.phase = Phase::Active;
        self.inactivity.arm(now, self.config.inactivity_timeout);
    }

    fn enter_logged_out(&mut self) {
        self.inactivity.cancel();
        self.grace.cancel();
        self.phase = Phase::LoggedOut;
    }

    #[cfg(test)]
    fn armed_timers(&self) -> (bool, bool) {
        (self.inactivity.is_armed(), self.grace.is_armed())
    }
}

impl Drop for InactivityMonitor {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::tests::token_expiring_at;
    use crate::auth::{MemoryTokenStore, Session};

    const MS: Duration = Duration::from_millis(1);

    fn mounted() -> (InactivityMonitor, Instant) {
        let start = Instant::now();
        (InactivityMonitor::mount(MonitorConfig::default(), start), start)
    }

    /// Drive the monitor to `PendingConfirmation`, returning the prompt instant
    fn idle_until_prompt(monitor: &mut InactivityMonitor, start: Instant) -> Instant {
        let at = start + INACTIVITY_TIMEOUT;
        assert_eq!(monitor.poll(at), Some(MonitorAction::PromptPresence));
        at
    }

    #[test]
    fn test_prompt_fires_exactly_at_timeout() {
        let (mut monitor, start) = mounted();

        assert_eq!(monitor.poll(start + INACTIVITY_TIMEOUT - MS), None);
        assert_eq!(monitor.phase(), Phase::Active);

        assert_eq!(monitor.poll(start + INACTIVITY_TIMEOUT), Some(MonitorAction::PromptPresence));
        assert_eq!(monitor.phase(), Phase::PendingConfirmation);
    }

    #[test]
    fn test_input_during_prompt_requires_full_timeout_again() {
        let (mut monitor, start) = mounted();
        let prompted = idle_until_prompt(&mut monitor, start);

        let moved = prompted + Duration::from_secs(1);
        assert!(monitor.record_activity(InputEvent::PointerMove, moved));
        assert_eq!(monitor.phase(), Phase::Active);

        // The old grace deadline passes without effect
        assert_eq!(monitor.poll(prompted + GRACE_PERIOD), None);
        assert_eq!(monitor.poll(moved + INACTIVITY_TIMEOUT - MS), None);
        assert_eq!(monitor.phase(), Phase::Active);

        assert_eq!(monitor.poll(moved + INACTIVITY_TIMEOUT), Some(MonitorAction::PromptPresence));
    }

    #[test]
    fn test_activity_resets_timeout_while_active() {
        let (mut monitor, start) = mounted();
        let typed = start + Duration::from_secs(200);

        assert!(monitor.record_activity(InputEvent::KeyDown, typed));
        assert_eq!(monitor.last_activity_at(), typed);
        assert_eq!(monitor.poll(start + INACTIVITY_TIMEOUT), None);
        assert_eq!(monitor.remaining(start + INACTIVITY_TIMEOUT), Some(Duration::from_secs(200)));
    }

    #[test]
    fn test_grace_expiry_logs_out_and_clears_token_once() {
        let mut session = Session::new(MemoryTokenStore::default());
        session
            .login("admin", token_expiring_at(chrono::Utc::now() + chrono::Duration::hours(1)))
            .unwrap();

        let (mut monitor, start) = mounted();
        let prompted = idle_until_prompt(&mut monitor, start);

        assert_eq!(monitor.poll(prompted + GRACE_PERIOD - MS), None);

        let mut logouts = 0;
        for step in 0..5u32 {
            if let Some(MonitorAction::Logout) = monitor.poll(prompted + GRACE_PERIOD + MS * step) {
                logouts += 1;
                session.logout().unwrap();
            }
        }

        assert_eq!(logouts, 1);
        assert_eq!(monitor.phase(), Phase::LoggedOut);
        assert!(session.token().is_none());
        assert_eq!(session.store().clear_count(), 1);
    }

    #[test]
    fn test_confirm_presence_restarts_timeout() {
        let (mut monitor, start) = mounted();
        let prompted = idle_until_prompt(&mut monitor, start);

        let confirmed = prompted + Duration::from_secs(2);
        assert!(monitor.confirm_presence(confirmed));
        assert_eq!(monitor.phase(), Phase::Active);
        assert_eq!(monitor.armed_timers(), (true, false));

        assert_eq!(monitor.poll(confirmed + INACTIVITY_TIMEOUT - MS), None);
    }

    #[test]
    fn test_confirm_presence_only_from_prompt() {
        let (mut monitor, start) = mounted();
        assert!(!monitor.confirm_presence(start + MS));
        assert_eq!(monitor.armed_timers(), (true, false));
    }

    #[test]
    fn test_never_both_timers_armed() {
        let (mut monitor, start) = mounted();
        assert_eq!(monitor.armed_timers(), (true, false));

        let prompted = idle_until_prompt(&mut monitor, start);
        assert_eq!(monitor.armed_timers(), (false, true));

        monitor.poll(prompted + GRACE_PERIOD);
        assert_eq!(monitor.armed_timers(), (false, false));
    }

    #[test]
    fn test_request_logout_from_any_state() {
        let (mut monitor, _) = mounted();
        assert_eq!(monitor.request_logout(), Some(MonitorAction::Logout));
        assert_eq!(monitor.phase(), Phase::LoggedOut);
        assert_eq!(monitor.request_logout(), None);

        let (mut monitor, start) = mounted();
        idle_until_prompt(&mut monitor, start);
        assert_eq!(monitor.request_logout(), Some(MonitorAction::Logout));
    }

    #[test]
    fn test_logged_out_is_terminal() {
        let (mut monitor, _) = mounted();
        monitor.request_logout();

        let later = Instant::now() + INACTIVITY_TIMEOUT * 2;
        assert!(!monitor.record_activity(InputEvent::Click, later));
        assert_eq!(monitor.poll(later), None);
        assert_eq!(monitor.phase(), Phase::LoggedOut);
        assert_eq!(monitor.remaining(later), None);
    }

    #[test]
    fn test_teardown_makes_everything_a_no_op() {
        let (mut monitor, start) = mounted();
        idle_until_prompt(&mut monitor, start);

        monitor.teardown();
        assert!(!monitor.is_mounted());
        assert_eq!(monitor.armed_timers(), (false, false));

        let later = start + INACTIVITY_TIMEOUT * 3;
        assert_eq!(monitor.poll(later), None);
        assert!(!monitor.record_activity(InputEvent::KeyDown, later));
        assert_eq!(monitor.request_logout(), None);

        // Idempotent
        monitor.teardown();
    }

    #[test]
    fn test_unrepresentable_timeout_never_fires() {
        let config = MonitorConfig {
            inactivity_timeout: Duration::MAX,
            grace_period: GRACE_PERIOD,
        };
        let start = Instant::now();
        let mut monitor = InactivityMonitor::mount(config, start);

        assert_eq!(monitor.phase(), Phase::Active);
        assert_eq!(monitor.poll(start + INACTIVITY_TIMEOUT * 1000), None);
        assert_eq!(monitor.remaining(start), None);
    }

    #[test]
    fn test_custom_timeouts() {
        let config = MonitorConfig {
            inactivity_timeout: Duration::from_secs(30),
            grace_period: Duration::from_secs(10),
        };
        let start = Instant::now();
        let mut monitor = InactivityMonitor::mount(config, start);

        let prompted = start + Duration::from_secs(30);
        assert_eq!(monitor.poll(prompted), Some(MonitorAction::PromptPresence));
        assert_eq!(monitor.remaining(prompted), Some(Duration::from_secs(10)));
        assert_eq!(monitor.poll(prompted + Duration::from_secs(10)), Some(MonitorAction::Logout));
    }
}
