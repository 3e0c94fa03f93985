//! API response types shared by the feature slices

pub mod response;

pub use response::ApiResponse;
