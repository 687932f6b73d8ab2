use parking_lot::RwLock;

/// Bearer credentials for authenticated calls.
///
/// Shared by `Arc` with every client that needs it; the token lives from
/// `login` until `logout`.
#[derive(Debug, Default)]
pub struct AuthSession {
    token: RwLock<Option<String>>,
}

impl AuthSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session that starts out logged in.
    pub fn with_token(token: impl Into<String>) -> Self {
        let session = Self::new();
        session.login(token);
        session
    }

    pub fn login(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
        log::debug!("auth session logged in");
    }

    pub fn logout(&self) {
        if self.token.write().take().is_some() {
            log::debug!("auth session logged out");
        }
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.read().is_some()
    }
}
