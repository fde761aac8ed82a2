use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::store::SessionStore;
use super::TokenProvider;
use crate::backend::BalanceSource;
use crate::error::CallError;

/// Signed-in account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// Token and account of a signed-in user.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub token: String,
    pub user: User,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("token", &"<redacted>")
            .field("user", &self.user)
            .finish()
    }
}

/// Shared sign-in state and last known token balance.
///
/// Balance observers subscribe through [`AuthContext::subscribe_balance`]
/// and are notified whenever a refresh or a call records a new value.
pub struct AuthContext {
    session: RwLock<Option<AuthSession>>,
    balance: watch::Sender<Option<i64>>,
    store: Option<Arc<dyn SessionStore>>,
}

impl Default for AuthContext {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthContext {
    pub fn new() -> Self {
        let (balance, _) = watch::channel(None);
        Self {
            session: RwLock::new(None),
            balance,
            store: None,
        }
    }

    /// Persist sign-in through `store`, restoring any saved session.
    pub fn with_store(store: Arc<dyn SessionStore>) -> Result<Self, CallError> {
        let restored = store.load()?;
        let context = Self {
            store: Some(store),
            ..Self::new()
        };
        if let Some(session) = restored {
            tracing::debug!(user = %session.user.email, "Restored saved session");
            *context.session.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
        }
        Ok(context)
    }

    pub fn login(&self, token: impl Into<String>, user: User) -> Result<(), CallError> {
        let session = AuthSession {
            token: token.into(),
            user,
        };
        if let Some(store) = &self.store {
            store.save(&session)?;
        }
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
        Ok(())
    }

    pub fn logout(&self) -> Result<(), CallError> {
        self.session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.balance.send_replace(None);
        if let Some(store) = &self.store {
            store.clear()?;
        }
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn token(&self) -> Option<String> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|session| session.token.clone())
    }

    pub fn user(&self) -> Option<User> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|session| session.user.clone())
    }

    pub fn balance(&self) -> Option<i64> {
        *self.balance.borrow()
    }

    pub fn subscribe_balance(&self) -> watch::Receiver<Option<i64>> {
        self.balance.subscribe()
    }

    /// Fetch the balance for the signed-in user. `Ok(None)` when signed out.
    pub async fn refresh_balance(
        &self,
        source: &dyn BalanceSource,
    ) -> Result<Option<i64>, CallError> {
        let Some(token) = self.token() else {
            return Ok(None);
        };
        let balance = source.fetch_balance(&token).await?;
        self.record_balance(balance);
        Ok(Some(balance))
    }
}

impl TokenProvider for AuthContext {
    fn bearer_token(&self) -> Option<String> {
        self.token()
    }

    fn record_balance(&self, balance: i64) {
        self.balance.send_replace(Some(balance));
    }
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("authenticated", &self.is_authenticated())
            .field("balance", &self.balance())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedBalance(i64);

    #[async_trait]
    impl BalanceSource for FixedBalance {
        async fn fetch_balance(&self, bearer_token: &str) -> Result<i64, CallError> {
            assert_eq!(bearer_token, "tok");
            Ok(self.0)
        }
    }

    fn user() -> User {
        User {
            id: "u1".into(),
            email: "a@b.c".into(),
            name: None,
            avatar: None,
        }
    }

    #[tokio::test]
    async fn refresh_notifies_balance_subscribers() {
        let auth = AuthContext::new();
        let mut balance = auth.subscribe_balance();
        assert_eq!(auth.refresh_balance(&FixedBalance(7)).await.unwrap(), None);

        auth.login("tok", user()).unwrap();
        assert_eq!(auth.refresh_balance(&FixedBalance(42)).await.unwrap(), Some(42));
        assert!(balance.has_changed().unwrap());
        assert_eq!(*balance.borrow_and_update(), Some(42));
    }

    #[test]
    fn logout_clears_token_and_balance() {
        let auth = AuthContext::new();
        auth.login("tok", user()).unwrap();
        auth.record_balance(10);
        assert_eq!(auth.bearer_token().as_deref(), Some("tok"));

        auth.logout().unwrap();
        assert!(!auth.is_authenticated());
        assert_eq!(auth.bearer_token(), None);
        assert_eq!(auth.balance(), None);
    }

    #[test]
    fn debug_never_prints_token() {
        let session = AuthSession {
            token: "secret-token".into(),
            user: user(),
        };
        assert!(!format!("{session:?}").contains("secret-token"));
    }
}
