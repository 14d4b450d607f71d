pub mod archival;
pub mod cadence;
pub mod daemon;

pub use archival::{ArchivalJob, ArchivalPolicy, RunReport, SchedulerState, WindowReport};
pub use cadence::DailyCadence;
pub use daemon::ArchivalDaemon;
