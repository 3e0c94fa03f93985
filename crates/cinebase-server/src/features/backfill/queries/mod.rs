pub mod get_status;
pub mod health;

pub use get_status::GetBackfillStatusQuery;
pub use health::BackfillHealthQuery;
