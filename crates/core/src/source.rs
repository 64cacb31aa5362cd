use async_trait::async_trait;

use crate::error::Result;
use crate::table::RawTable;

/// Where raw sensor rows come from.
///
/// An empty table means "no new data" and is not an error; callers treat it
/// as a no-op cycle.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Fetch the current raw table.
    async fn load(&self) -> Result<RawTable>;
}
