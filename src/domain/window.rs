use crate::error::TrendingError;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Trailing period over which view scores accumulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankingWindow {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl RankingWindow {
    /// Windows that receive an increment on every committed view.
    pub const ALL: [RankingWindow; 4] = [
        RankingWindow::Daily,
        RankingWindow::Weekly,
        RankingWindow::Monthly,
        RankingWindow::Yearly,
    ];

    /// Windows rotated by the archival job, in processing order.
    pub const ROTATED: [RankingWindow; 3] = [
        RankingWindow::Daily,
        RankingWindow::Weekly,
        RankingWindow::Monthly,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RankingWindow::Daily => "daily",
            RankingWindow::Weekly => "weekly",
            RankingWindow::Monthly => "monthly",
            RankingWindow::Yearly => "yearly",
        }
    }
}

impl fmt::Display for RankingWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RankingWindow {
    type Err = TrendingError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "daily" => Ok(RankingWindow::Daily),
            "weekly" => Ok(RankingWindow::Weekly),
            "monthly" => Ok(RankingWindow::Monthly),
            "yearly" => Ok(RankingWindow::Yearly),
            _ => Err(TrendingError::InvalidArgument(format!(
                "unknown period {raw:?}, expected daily, weekly, monthly or yearly"
            ))),
        }
    }
}

/// Name of an immutable snapshot of a window taken at rotation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArchiveKey {
    pub window: RankingWindow,
    pub rotated_at: DateTime<Utc>,
}

impl ArchiveKey {
    #[must_use]
    pub fn new(window: RankingWindow, rotated_at: DateTime<Utc>) -> Self {
        Self { window, rotated_at }
    }

    /// Suffix stored after `<window>:`; milliseconds since the epoch.
    #[must_use]
    pub fn stamp(&self) -> i64 {
        self.rotated_at.timestamp_millis()
    }
}

impl PartialOrd for ArchiveKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ArchiveKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rotated_at
            .cmp(&other.rotated_at)
            .then(self.window.cmp(&other.window))
    }
}

/// Storage key layout under a shared namespace prefix.
///
/// `<prefix><window>` holds the live window, `<prefix><window>:<millis>` its
/// archives. Archive listing only ever matches `<prefix><window>:`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[must_use]
    pub fn live(&self, window: RankingWindow) -> String {
        format!("{}{}", self.prefix, window.as_str())
    }

    #[must_use]
    pub fn archive_prefix(&self, window: RankingWindow) -> String {
        format!("{}{}:", self.prefix, window.as_str())
    }

    #[must_use]
    pub fn archive(&self, key: &ArchiveKey) -> String {
        format!("{}{}", self.archive_prefix(key.window), key.stamp())
    }

    /// Parse a stored archive name back into its key. Foreign or malformed
    /// names yield `None`.
    #[must_use]
    pub fn parse_archive(&self, window: RankingWindow, name: &str) -> Option<ArchiveKey> {
        let stamp = name.strip_prefix(&self.archive_prefix(window))?;
        if stamp.is_empty() || !stamp.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let millis: i64 = stamp.parse().ok()?;
        let rotated_at = Utc.timestamp_millis_opt(millis).single()?;
        Some(ArchiveKey::new(window, rotated_at))
    }

    #[must_use]
    pub fn archival_lease(&self) -> String {
        format!("{}lock:archival", self.prefix)
    }

    #[must_use]
    pub fn debounce(&self, viewer: &str, article: impl fmt::Display) -> String {
        format!("{}seen:{viewer}:{article}", self.prefix)
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new("trending:")
    }
}
