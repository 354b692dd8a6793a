//! In-memory execution sink for paper trading.

use crate::domain::error::TraderError;
use crate::domain::live::{OrderAck, OrderRequest};
use crate::ports::execution_port::ExecutionPort;
use std::sync::Mutex;
use tracing::info;

/// Accepts every well-formed order and records it. The balance is fixed; the
/// broker does not fill or mark positions.
pub struct PaperBroker {
    balance: f64,
    orders: Mutex<Vec<OrderRequest>>,
}

impl PaperBroker {
    pub fn new(balance: f64) -> Self {
        Self {
            balance,
            orders: Mutex::new(Vec::new()),
        }
    }

    /// Orders accepted so far, oldest first.
    pub fn orders(&self) -> Vec<OrderRequest> {
        self.orders
            .lock()
            .map(|o| o.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl ExecutionPort for PaperBroker {
    fn balance(&self) -> Result<f64, TraderError> {
        Ok(self.balance)
    }

    fn submit(&self, order: &OrderRequest) -> Result<OrderAck, TraderError> {
        if !(order.size.is_finite() && order.size > 0.0) {
            return Err(TraderError::external(
                &order.instrument,
                format!("rejected order size {}", order.size),
            ));
        }
        let mut orders = self
            .orders
            .lock()
            .map_err(|_| TraderError::external(&order.instrument, "order log poisoned"))?;
        orders.push(order.clone());
        let order_id = format!("PAPER-{}", orders.len());
        info!(
            order_id = %order_id,
            instrument = %order.instrument,
            side = order.side.as_str(),
            size = order.size,
            stop = order.stop_price,
            "paper order"
        );
        Ok(OrderAck { order_id })
    }
}
