pub mod resume;
pub mod start;
pub mod stop;

pub use resume::ResumeBackfillCommand;
pub use start::StartBackfillCommand;
pub use stop::StopBackfillCommand;
