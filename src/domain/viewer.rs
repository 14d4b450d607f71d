use crate::error::TrendingError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

const MAX_VIEWER_ID_LEN: usize = 128;

/// Opaque viewer key (session cookie, device id) used only for debouncing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewerId(String);

impl ViewerId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ViewerId {
    type Err = TrendingError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw.is_empty() {
            return Err(TrendingError::InvalidArgument(
                "viewer id cannot be empty".to_string(),
            ));
        }
        if raw.len() > MAX_VIEWER_ID_LEN {
            return Err(TrendingError::InvalidArgument(format!(
                "viewer id longer than {MAX_VIEWER_ID_LEN} bytes"
            )));
        }
        if raw.chars().any(|c| c.is_whitespace() || c.is_control() || c == ':') {
            return Err(TrendingError::InvalidArgument(
                "viewer id contains forbidden characters".to_string(),
            ));
        }
        Ok(Self(raw.to_string()))
    }
}

impl fmt::Display for ViewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immediate result of a view signal, before any deferred commit runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewStatus {
    /// A commit is armed and will fire after the settle delay.
    Scheduled,
    /// The viewer already counted for this article within the cooldown.
    Debounced,
    /// A commit for this viewer/article pair is already armed.
    AlreadyPending,
}
