pub mod get_festival_year;
pub mod get_list_import;

pub use get_festival_year::{FestivalYearProgress, GetFestivalYearQuery};
pub use get_list_import::GetListImportQuery;
