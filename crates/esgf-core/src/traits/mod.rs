//! Core traits at the component seams.

mod search;
mod store;

pub use search::SearchService;
pub use store::{DatasetRepository, RunRepository};
