pub mod memory;
pub mod yahoo;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::SourceError;
use crate::types::{InstrumentId, PriceBar};

pub use memory::InMemorySource;
pub use yahoo::YahooSource;

/// Supplier of raw daily bars. Bars may be unordered, duplicated or carry
/// missing closes; ingestion cleans them up.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Daily bars for `instrument` dated within `[start, end]`.
    async fn fetch_bars(
        &self,
        instrument: &InstrumentId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, SourceError>;
}
