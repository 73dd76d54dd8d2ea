//! Payment collaborator.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;
use crate::domain::value_objects::Money;
use crate::{EcommerceError, Result};

/// What the gateway said about a charge. Transport failures are errors, not
/// declines.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PaymentOutcome {
    Approved { reference: String },
    Declined { reason: String },
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, order_id: Uuid, amount: Money) -> Result<PaymentOutcome>;
}

/// Simulated gateway. Declines any amount whose cents end in `.13`.
#[derive(Clone, Debug)]
pub struct MockGateway {
    latency: Duration,
}

impl MockGateway {
    pub fn new(latency: Duration) -> Self { Self { latency } }
}

impl Default for MockGateway {
    fn default() -> Self { Self::new(Duration::from_millis(50)) }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    #[tracing::instrument(skip(self, order_id, amount), fields(amount = %amount))]
    async fn charge(&self, order_id: Uuid, amount: Money) -> Result<PaymentOutcome> {
        if amount <= Money::ZERO {
            return Err(EcommerceError::InvalidArgument("charge amount must be greater than zero".into()));
        }
        tokio::time::sleep(self.latency).await;
        let cents = (amount.amount() * Decimal::ONE_HUNDRED).trunc() % Decimal::ONE_HUNDRED;
        if cents == Decimal::from(13) {
            tracing::info!(%order_id, "mock payment declined");
            return Ok(PaymentOutcome::Declined { reason: "declined by test condition".into() });
        }
        tracing::info!(%order_id, "mock payment approved");
        Ok(PaymentOutcome::Approved { reference: format!("mock_ch_{}", Uuid::new_v4().simple()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_gateway_outcomes() {
        let gateway = MockGateway::new(Duration::ZERO);
        let ok = gateway.charge(Uuid::nil(), Money::from_cents(2500)).await.unwrap();
        assert!(matches!(ok, PaymentOutcome::Approved { ref reference } if reference.starts_with("mock_ch_")));
        let declined = gateway.charge(Uuid::nil(), Money::from_cents(4213)).await.unwrap();
        assert!(matches!(declined, PaymentOutcome::Declined { .. }));
        assert!(gateway.charge(Uuid::nil(), Money::ZERO).await.is_err());
    }
}
