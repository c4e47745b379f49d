mod db;
mod error;
mod models;

pub use db::Store;
pub use error::{PersistenceError, PersistenceResult};
pub use models::{AssetFilter, CollectionStats, GpsBounds, LocationCount, TagCount};
