//! UI locale and the `Accept-Language` header it maps to.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Locales the backend localizes responses for.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Locale {
    #[default]
    Id,
    En,
    Zh,
    Ar,
}

impl Locale {
    /// `Accept-Language` value sent with every backend request.
    pub fn accept_language(self) -> &'static str {
        match self {
            Self::Id => "id-ID,id;q=0.9",
            Self::En => "en-US,en;q=0.9",
            Self::Zh => "zh-CN,zh;q=0.9",
            Self::Ar => "ar-SA,ar;q=0.9",
        }
    }
}
