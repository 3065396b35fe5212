use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::store::TokenStore;
use super::token;

/// The session context: the one owner of the stored bearer token.
///
/// Login is the only way a token gets in and `logout` the only way it gets
/// out. Both are safe to repeat.
pub struct Session<S: TokenStore = Box<dyn TokenStore>> {
    store: S,
    token: Option<String>,
    username: Option<String>,
}

impl<S: TokenStore> Session<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            token: None,
            username: None,
        }
    }

    /// Load the stored token. An expired or malformed token is discarded.
    ///
    /// Returns whether a usable token was found.
    pub fn load(&mut self) -> Result<bool> {
        match self.store.load()? {
            Some(token) if !token::is_expired(Some(&token)) => {
                self.username = token::decode_claims(&token).ok().and_then(|c| c.sub);
                self.token = Some(token);
                debug!("Stored session restored");
                Ok(true)
            }
            Some(_) => {
                info!("Stored session has expired");
                self.logout()?;
                Ok(false)
            }
            None => Ok(false),
        }
    }

    /// Start a session with a freshly issued token.
    ///
    /// The in-memory session exists even when persisting the token fails; the
    /// error only means the session will not survive a restart.
    pub fn login(&mut self, username: &str, token: String) -> Result<()> {
        if token::is_expired(Some(&token)) {
            warn!("Server issued a token that is already expired or unreadable");
        }
        self.username = Some(username.to_string());
        let saved = self.store.save(&token);
        self.token = Some(token);
        info!(username = username, "Session started");
        saved
    }

    /// End the session: forget the token and clear storage.
    ///
    /// Returns whether a session was actually ended. Calling this again is a
    /// no-op that still succeeds, and retries a clear that failed before.
    /// The in-memory token is gone even when clearing storage fails.
    pub fn logout(&mut self) -> Result<bool> {
        let had_token = self.token.take().is_some();
        self.username = None;
        if had_token {
            info!("Session ended");
        }
        self.store.clear()?;
        Ok(had_token)
    }

    /// The raw token, expired or not
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// The token if it is still usable for an authenticated call
    pub fn valid_token(&self) -> Option<&str> {
        self.token().filter(|t| !token::is_expired(Some(t)))
    }

    pub fn is_valid(&self) -> bool {
        self.valid_token().is_some()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.token().and_then(token::expires_at)
    }

    /// Minutes left before the token expires (for display)
    pub fn minutes_until_expiry(&self) -> Option<i64> {
        self.expires_at()
            .map(|exp| (exp - Utc::now()).num_minutes().max(0))
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::MemoryTokenStore;
    use crate::auth::token::tests::token_expiring_at;
    use chrono::Duration;

    fn live_token() -> String {
        token_expiring_at(Utc::now() + Duration::hours(1))
    }

    #[test]
    fn test_load_restores_live_token() {
        let token = live_token();
        let mut session = Session::new(MemoryTokenStore::with_token(token.clone()));

        assert!(session.load().unwrap());
        assert_eq!(session.valid_token(), Some(token.as_str()));
        assert_eq!(session.username(), Some("admin"));
    }

    #[test]
    fn test_load_discards_expired_token() {
        let expired = token_expiring_at(Utc::now() - Duration::seconds(10));
        let mut session = Session::new(MemoryTokenStore::with_token(expired));

        assert!(!session.load().unwrap());
        assert!(session.token().is_none());
        assert_eq!(session.store().load().unwrap(), None);
    }

    #[test]
    fn test_login_persists_token() {
        let token = live_token();
        let mut session = Session::new(MemoryTokenStore::default());
        session.login("admin", token.clone()).unwrap();

        assert!(session.is_valid());
        assert_eq!(session.store().load().unwrap(), Some(token));
        assert!(session.minutes_until_expiry().unwrap() >= 59);
    }

    #[test]
    fn test_logout_twice_is_harmless() {
        let mut session = Session::new(MemoryTokenStore::default());
        session.login("admin", live_token()).unwrap();

        assert!(session.logout().unwrap());
        assert!(!session.logout().unwrap());

        assert!(session.token().is_none());
        assert_eq!(session.store().load().unwrap(), None);
        assert_eq!(session.store().clear_count(), 1);
    }

    /// Memory store whose writes can be made to fail
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryTokenStore,
        fail_save: bool,
        fail_clear: bool,
    }

    impl TokenStore for FlakyStore {
        fn load(&self) -> Result<Option<String>> {
            self.inner.load()
        }

        fn save(&mut self, token: &str) -> Result<()> {
            if self.fail_save {
                anyhow::bail!("read-only cache dir");
            }
            self.inner.save(token)
        }

        fn clear(&mut self) -> Result<()> {
            if self.fail_clear {
                anyhow::bail!("keychain unavailable");
            }
            self.inner.clear()
        }
    }

    #[test]
    fn test_login_keeps_session_when_save_fails() {
        let token = live_token();
        let mut session = Session::new(FlakyStore {
            fail_save: true,
            ..Default::default()
        });

        assert!(session.login("admin", token.clone()).is_err());
        assert_eq!(session.valid_token(), Some(token.as_str()));
        assert_eq!(session.username(), Some("admin"));
        assert_eq!(session.store().load().unwrap(), None);
    }

    #[test]
    fn test_failed_clear_is_reported_and_retried() {
        let mut session = Session::new(FlakyStore::default());
        session.login("admin", live_token()).unwrap();

        session.store.fail_clear = true;
        assert!(session.logout().is_err());
        assert!(session.token().is_none());
        assert!(session.store().load().unwrap().is_some());

        session.store.fail_clear = false;
        assert!(!session.logout().unwrap());
        assert_eq!(session.store().load().unwrap(), None);
    }

    #[test]
    fn test_valid_token_hides_expired_token() {
        let mut session = Session::new(MemoryTokenStore::default());
        session
            .login("admin", token_expiring_at(Utc::now() - Duration::seconds(1)))
            .unwrap();

        assert!(session.token().is_some());
        assert!(session.valid_token().is_none());
        assert!(!session.is_valid());
    }
}
