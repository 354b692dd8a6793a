//! Order execution port trait (live mode).

use crate::domain::error::TraderError;
use crate::domain::live::{OrderAck, OrderRequest};

pub trait ExecutionPort: Send + Sync {
    /// Account balance in quote currency, used for position sizing.
    fn balance(&self) -> Result<f64, TraderError>;

    /// Submit a market order with its protective stop. Acceptance is the only
    /// state the caller tracks.
    fn submit(&self, order: &OrderRequest) -> Result<OrderAck, TraderError>;
}
