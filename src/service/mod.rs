pub mod ranking;
pub mod recorder;
pub mod trending;

pub use ranking::RankingService;
pub use recorder::{CommitOutcome, ViewPolicy, ViewRecorder, ViewTicket, ViewerContext, ViewerRegistry};
pub use trending::{MAX_TRENDING_LIMIT, TrendingService};
