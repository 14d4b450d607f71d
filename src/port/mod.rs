pub mod article_catalog;
pub mod clock;
pub mod debounce_store;
pub mod ranking_store;

pub use article_catalog::ArticleCatalog;
pub use clock::{Clock, SystemClock};
pub use debounce_store::DebounceStore;
pub use ranking_store::{RankingStore, RenameOutcome, StoreFuture};
