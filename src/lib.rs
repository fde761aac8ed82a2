//! Ceritain realtime voice calls.
//!
//! Drives a peer-to-peer voice session with the AI companion: negotiates the
//! session, detects who is speaking on each side, meters speaking time
//! against the user's token balance, and tears everything down on hang-up
//! or depletion. Host media primitives (microphone, peer connection, audio
//! output) are injected through the traits in [`media`].
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use ceritain_call::prelude::*;
//!
//! # async fn example(deps: ConnectionDeps) -> ceritain_call::error::Result<()> {
//! let config = CallConfig::from_env();
//! let backends = CallBackends::ceritain(CeritainApi::from_config(&config));
//! let tokens = Arc::new(AuthContext::new());
//! let controller = RealtimeCallController::new(&config, deps, backends, tokens);
//!
//! let mut snapshots = controller.subscribe_snapshot();
//! controller.connect().await?;
//! println!("{}", snapshots.borrow_and_update().status);
//! controller.disconnect();
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod backend;
pub mod call;
pub mod config;
pub mod error;
pub mod media;
pub mod prelude;
pub mod types;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
