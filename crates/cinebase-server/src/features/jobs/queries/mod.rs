pub mod count_jobs;
pub mod get_job;
pub mod list_jobs;

pub use count_jobs::CountJobsQuery;
pub use get_job::GetJobQuery;
pub use list_jobs::{ListJobsQuery, ListJobsResponse};
