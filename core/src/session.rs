use std::sync::{Arc, Mutex};

/// Header carrying the daemon's CSRF session token, both on the 409 challenge
/// and on every authenticated request.
pub const SESSION_ID_HEADER: &str = "X-Transmission-Session-Id";

/// Shared holder of the current session token.
///
/// Clones share the same slot, so several clients pointed at one daemon only
/// pay for the 409 handshake once. Writes replace the whole value under the
/// lock; readers never observe a partially written token.
#[derive(Clone, Debug, Default)]
pub struct SessionTokens {
    current: Arc<Mutex<Option<String>>>,
}

impl SessionTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<String> {
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replace the stored token. Returns `true` when the value changed.
    pub fn update(&self, token: impl Into<String>) -> bool {
        let token = token.into();
        let mut slot = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_deref() == Some(token.as_str()) {
            return false;
        }
        *slot = Some(token);
        true
    }

    /// Whether two handles share the same slot.
    pub fn shares_with(&self, other: &SessionTokens) -> bool {
        Arc::ptr_eq(&self.current, &other.current)
    }
}
