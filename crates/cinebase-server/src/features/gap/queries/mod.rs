pub mod missing_count;
pub mod missing_movies;

pub use missing_count::{MissingCountQuery, MissingCountResponse};
pub use missing_movies::{MissingMoviesQuery, MissingMoviesResponse};
