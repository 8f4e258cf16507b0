pub mod loader;
pub mod schema;

pub use loader::{load_pattern_book, DataLoadError, JobSpec, PatternBook};
