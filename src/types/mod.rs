//! Shared value types: voices, locales, participants, and usage outcomes.

pub mod locale;
pub mod session;
pub mod speaking;
pub mod usage;

pub use locale::*;
pub use session::*;
pub use speaking::*;
pub use usage::*;
