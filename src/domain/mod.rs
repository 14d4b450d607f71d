pub mod article;
pub mod viewer;
pub mod window;

pub use article::{ArticleId, ArticleRecord, ArticleScore, ArticleSummary};
pub use viewer::{ViewStatus, ViewerId};
pub use window::{ArchiveKey, KeySpace, RankingWindow};
