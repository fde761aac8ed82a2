//! Bearer token and balance state, passed explicitly to the controller.

pub mod context;
pub mod store;

pub use context::{AuthContext, AuthSession, User};
pub use store::{FileSessionStore, SessionStore};

/// Capability the call controller uses to authorize backend requests.
pub trait TokenProvider: Send + Sync {
    /// Current bearer token, if signed in.
    fn bearer_token(&self) -> Option<String>;

    /// Observe a freshly fetched balance.
    fn record_balance(&self, _balance: i64) {}
}

/// A fixed token, for tools and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    /// No token: backend calls go out unauthenticated and usage is not metered.
    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl TokenProvider for StaticToken {
    fn bearer_token(&self) -> Option<String> {
        self.0.clone()
    }
}
