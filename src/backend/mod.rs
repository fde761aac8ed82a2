//! Remote collaborators: credential issuance, offer/answer negotiation,
//! usage reporting, and balance queries.

pub mod ceritain;
pub mod http;
pub mod negotiation;

pub use ceritain::CeritainApi;
pub use negotiation::RealtimeNegotiator;

use async_trait::async_trait;

use crate::error::CallError;
use crate::types::{Participant, SessionCredential, SessionRequest, UsageReportOutcome};

/// Issues short-lived realtime session credentials.
#[async_trait]
pub trait SessionIssuer: Send + Sync {
    async fn issue(
        &self,
        request: &SessionRequest,
        bearer_token: Option<&str>,
    ) -> Result<SessionCredential, CallError>;
}

/// Exchanges a local offer for the remote answer.
#[async_trait]
pub trait Negotiator: Send + Sync {
    /// Consumes the credential; it authorizes exactly one exchange.
    async fn exchange(
        &self,
        offer_sdp: &str,
        credential: SessionCredential,
    ) -> Result<String, CallError>;
}

/// Reports speaking durations for billing.
#[async_trait]
pub trait UsageReporter: Send + Sync {
    async fn report(
        &self,
        participant: Participant,
        bearer_token: &str,
        seconds: u64,
    ) -> UsageReportOutcome;
}

/// Reads the current token balance.
#[async_trait]
pub trait BalanceSource: Send + Sync {
    async fn fetch_balance(&self, bearer_token: &str) -> Result<i64, CallError>;
}
