//! Device-token lifecycle.
//!
//! The store is the single source of the current token. Platform callbacks
//! are the only writers; channel operations read it or wait on it. While a
//! registration is outstanding every caller that needs a token parks a
//! oneshot sender here and is resolved by the next platform callback.

use std::sync::Mutex;

use {
    pushsub_common::{DeviceToken, PushError, Result},
    tokio::sync::oneshot,
};

type TokenWaiter = oneshot::Sender<Result<DeviceToken>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenState {
    Absent,
    /// Registration requested from the platform, no answer yet.
    Pending,
    Present(DeviceToken),
    /// The last registration attempt failed.
    Invalid { reason: String },
}

impl TokenState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Pending => "pending",
            Self::Present(_) => "present",
            Self::Invalid { .. } => "invalid",
        }
    }
}

/// Result of asking the store for a token.
#[derive(Debug)]
pub enum Acquisition {
    Ready(DeviceToken),
    /// A registration is already outstanding; wait for it.
    Join(oneshot::Receiver<Result<DeviceToken>>),
    /// No registration outstanding. The caller must ask the platform for
    /// one, then wait.
    Lead(oneshot::Receiver<Result<DeviceToken>>),
}

struct TokenInner {
    state: TokenState,
    waiters: Vec<TokenWaiter>,
}

pub struct TokenStore {
    inner: Mutex<TokenInner>,
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(TokenInner {
                state: TokenState::Absent,
                waiters: Vec::new(),
            }),
        }
    }

    pub fn state(&self) -> TokenState {
        self.lock().state.clone()
    }

    pub fn current(&self) -> Option<DeviceToken> {
        match &self.lock().state {
            TokenState::Present(token) => Some(token.clone()),
            _ => None,
        }
    }

    pub fn acquire(&self) -> Acquisition {
        let mut inner = self.lock();
        if let TokenState::Present(token) = &inner.state {
            return Acquisition::Ready(token.clone());
        }

        let (tx, rx) = oneshot::channel();
        inner.waiters.push(tx);
        if inner.state == TokenState::Pending {
            Acquisition::Join(rx)
        } else {
            inner.state = TokenState::Pending;
            Acquisition::Lead(rx)
        }
    }

    /// Store a freshly issued token and release every waiter with it.
    /// Returns the token it replaced, if one was present.
    pub fn set_registered(&self, token: DeviceToken) -> Option<DeviceToken> {
        let (previous, waiters) = {
            let mut inner = self.lock();
            let previous = match std::mem::replace(&mut inner.state, TokenState::Present(token.clone())) {
                TokenState::Present(previous) => Some(previous),
                _ => None,
            };
            (previous, std::mem::take(&mut inner.waiters))
        };
        for waiter in waiters {
            let _ = waiter.send(Ok(token.clone()));
        }
        previous
    }

    /// Mark registration failed; every waiter gets `TokenUnavailable`.
    /// Returns how many waiters were failed.
    pub fn set_failed(&self, reason: impl Into<String>) -> usize {
        let reason = reason.into();
        let waiters = {
            let mut inner = self.lock();
            inner.state = TokenState::Invalid {
                reason: reason.clone(),
            };
            std::mem::take(&mut inner.waiters)
        };
        fail_waiters(waiters, &reason)
    }

    /// Drop the current token. Returns it if one was present.
    pub fn revoke(&self) -> Option<DeviceToken> {
        let (previous, waiters) = {
            let mut inner = self.lock();
            let previous = match std::mem::replace(&mut inner.state, TokenState::Absent) {
                TokenState::Present(previous) => Some(previous),
                _ => None,
            };
            (previous, std::mem::take(&mut inner.waiters))
        };
        fail_waiters(waiters, "device token revoked");
        previous
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TokenInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn fail_waiters(waiters: Vec<TokenWaiter>, reason: &str) -> usize {
    let count = waiters.len();
    for waiter in waiters {
        let _ = waiter.send(Err(PushError::token_unavailable(reason)));
    }
    count
}
