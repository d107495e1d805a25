pub mod models;
pub mod repository;

pub use repository::Repository;

use crate::error::LoadError;
use models::CityBatch;
use std::future::Future;

/// Destination for accumulated weather records.
///
/// Implementations must be idempotent per record id: loading a record whose
/// id is already stored is a silent no-op, not an error.
pub trait Sink: Send + Sync {
    /// Persist `batch`, returning the number of newly written rows.
    fn load(&self, batch: &CityBatch) -> impl Future<Output = Result<u64, LoadError>> + Send;
}
