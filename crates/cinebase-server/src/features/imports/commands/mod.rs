pub mod fetch_movie;
pub mod import_festival;
pub mod import_list;
pub mod sync_festival;

pub use fetch_movie::FetchMovieCommand;
pub use import_festival::ImportFestivalCommand;
pub use import_list::ImportListCommand;
pub use sync_festival::{SyncFestivalCommand, SyncMode};
