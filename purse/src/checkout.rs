//! Order placement with wallet redemption.
//!
//! The order store and the ledger are separate systems, so placement is a two-step saga:
//! insert the order, then redeem the wallet share. A failed redemption is compensated by
//! deleting the order again; no ledger rows exist on that path.

use purse_core::{OrderId, UserId};
use purse_ledger::{LedgerError, Posting};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::WalletService;

/// Failure reported by the order store collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("order store failure: {0}")]
pub struct OrderStoreError(pub String);

/// Persistence for orders, owned by the surrounding commerce system.
pub trait OrderRepository: Send + Sync {
    fn insert_order(&self, order: &OrderRequest) -> Result<(), OrderStoreError>;
    fn delete_order(&self, order_id: &str) -> Result<(), OrderStoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub total: i64,
    /// Portion of `total` paid from the actual wallet.
    pub wallet_used: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutReceipt {
    pub order_id: OrderId,
    /// Ledger receipt of the redemption; absent when no wallet value was used.
    pub redemption: Option<Posting>,
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("invalid order request: {0}")]
    InvalidRequest(String),
    #[error("failed to create order {order_id}: {source}")]
    OrderCreation {
        order_id: OrderId,
        #[source]
        source: OrderStoreError,
    },
    #[error("wallet redemption failed for order {order_id}: {source}")]
    Redemption {
        order_id: OrderId,
        #[source]
        source: LedgerError,
    },
    #[error(
        "order {order_id} was left behind after redemption failed ({redemption}); removing it failed: {compensation}"
    )]
    CompensationFailed {
        order_id: OrderId,
        redemption: LedgerError,
        compensation: OrderStoreError,
    },
}

impl CheckoutError {
    /// The ledger error behind a failed redemption, whether or not compensation worked.
    pub fn ledger_error(&self) -> Option<&LedgerError> {
        match self {
            CheckoutError::Redemption { source, .. } => Some(source),
            CheckoutError::CompensationFailed { redemption, .. } => Some(redemption),
            _ => None,
        }
    }
}

fn validate(request: &OrderRequest) -> Result<(), CheckoutError> {
    if request.order_id.trim().is_empty() {
        return Err(CheckoutError::InvalidRequest("order id is empty".into()));
    }
    if request.user_id.trim().is_empty() {
        return Err(CheckoutError::InvalidRequest("user id is empty".into()));
    }
    if request.total < 0 || request.wallet_used < 0 {
        return Err(CheckoutError::InvalidRequest(format!(
            "amounts must not be negative (total {}, wallet {})",
            request.total, request.wallet_used
        )));
    }
    if request.wallet_used > request.total {
        return Err(CheckoutError::InvalidRequest(format!(
            "wallet amount {} exceeds order total {}",
            request.wallet_used, request.total
        )));
    }
    Ok(())
}

/// Create the order, then redeem `wallet_used` from the user's actual wallet.
pub fn place_order(
    orders: &dyn OrderRepository,
    wallet: &WalletService,
    request: &OrderRequest,
) -> Result<CheckoutReceipt, CheckoutError> {
    validate(request)?;
    orders
        .insert_order(request)
        .map_err(|source| CheckoutError::OrderCreation {
            order_id: request.order_id.clone(),
            source,
        })?;

    if request.wallet_used == 0 {
        info!(order_id = %request.order_id, "order placed without wallet redemption");
        return Ok(CheckoutReceipt {
            order_id: request.order_id.clone(),
            redemption: None,
        });
    }

    match wallet.redeem_actual(&request.user_id, request.wallet_used, &request.order_id) {
        Ok(posting) => {
            info!(
                order_id = %request.order_id,
                user_id = %request.user_id,
                wallet_used = request.wallet_used,
                "order placed"
            );
            Ok(CheckoutReceipt {
                order_id: request.order_id.clone(),
                redemption: Some(posting),
            })
        }
        Err(redemption) => {
            warn!(
                order_id = %request.order_id,
                user_id = %request.user_id,
                error = %redemption,
                "wallet redemption failed, deleting order"
            );
            match orders.delete_order(&request.order_id) {
                Ok(()) => Err(CheckoutError::Redemption {
                    order_id: request.order_id.clone(),
                    source: redemption,
                }),
                Err(compensation) => {
                    error!(
                        order_id = %request.order_id,
                        error = %compensation,
                        "order compensation failed"
                    );
                    Err(CheckoutError::CompensationFailed {
                        order_id: request.order_id.clone(),
                        redemption,
                        compensation,
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingOrders {
        calls: Mutex<Vec<String>>,
    }

    impl OrderRepository for RecordingOrders {
        fn insert_order(&self, order: &OrderRequest) -> Result<(), OrderStoreError> {
            self.calls.lock().push(format!("insert {}", order.order_id));
            Ok(())
        }

        fn delete_order(&self, order_id: &str) -> Result<(), OrderStoreError> {
            self.calls.lock().push(format!("delete {order_id}"));
            Ok(())
        }
    }

    fn request(total: i64, wallet_used: i64) -> OrderRequest {
        OrderRequest {
            order_id: "O9".into(),
            user_id: "u".into(),
            total,
            wallet_used,
        }
    }

    #[test]
    fn oversized_wallet_share_is_rejected_before_any_write() {
        let orders = RecordingOrders::default();
        let wallet = WalletService::in_memory();
        let err = place_order(&orders, &wallet, &request(10, 11)).unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidRequest(_)));
        assert!(orders.calls.lock().is_empty());
    }

    #[test]
    fn zero_wallet_share_skips_ledger() {
        let orders = RecordingOrders::default();
        let wallet = WalletService::in_memory();
        let receipt = place_order(&orders, &wallet, &request(10, 0)).unwrap();
        assert!(receipt.redemption.is_none());
        assert_eq!(*orders.calls.lock(), vec!["insert O9".to_string()]);
    }

    #[test]
    fn unknown_user_is_compensated() {
        let orders = RecordingOrders::default();
        let wallet = WalletService::in_memory();
        let err = place_order(&orders, &wallet, &request(10, 5)).unwrap_err();
        assert!(matches!(
            err.ledger_error(),
            Some(LedgerError::AccountNotFound(_))
        ));
        assert_eq!(
            *orders.calls.lock(),
            vec!["insert O9".to_string(), "delete O9".to_string()]
        );
    }
}
