//! Market data port trait.

use crate::domain::error::TraderError;
use crate::domain::ohlcv::Bar;
use crate::domain::timeframe::Timeframe;

pub trait MarketDataPort: Send + Sync {
    /// The most recent `limit` bars of (instrument, timeframe), oldest first.
    /// A `limit` of 0 returns the whole available history.
    fn fetch_bars(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Bar>, TraderError>;

    /// Whether any history exists for the pair.
    fn has_series(&self, instrument: &str, timeframe: Timeframe) -> bool;
}
