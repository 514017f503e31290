// Plan transition handler
// Consumes verified payment lifecycle events and mutates account plan state
// so the very next entitlement evaluation reflects the new plan.
//
// Writes are scoped to the plan/limit/billing fields; the usage counter is
// only ever written here as an absolute reset, so these transitions cannot
// race destructively with the recorder's atomic increments.

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::plans::PlanCatalog;
use crate::db::DieselPool;
use crate::models::user::{Plan, PlanUpdate, User, UserError};

// =============================================================================
// EVENT TYPES
// =============================================================================

/// Payment lifecycle events, already signature-verified by the webhook layer
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentEvent {
    CheckoutCompleted {
        customer_ref: String,
        subscription_ref: String,
        price_id: String,
        /// The checkout session's client reference: our account id. A
        /// first-time upgrader has no stored customer reference yet, so
        /// this is the primary resolution key.
        account_ref: Option<String>,
    },
    SubscriptionDeleted {
        subscription_ref: String,
    },
    SubscriptionUpdated {
        subscription_ref: String,
        status: String,
    },
}

/// What a processed event did to account state
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    Applied { account_id: Uuid, plan: Plan },
    /// Recognized event, but no entitlement change required
    NoChange,
    /// No account matched the event's references; logged and dropped
    NoMatch,
}

#[derive(Debug, Error)]
pub enum PlanTransitionError {
    /// The checkout referenced a price absent from configuration. An
    /// integration error: no entitlement change, never a guessed plan.
    #[error("Unmapped plan identifier: {0}")]
    UnmappedPlanIdentifier(String),

    #[error("Database error: {0}")]
    Database(String),
}

/// Subscription statuses that revoke paid access
pub fn is_delinquent_status(status: &str) -> bool {
    matches!(status, "past_due" | "canceled" | "unpaid")
}

// =============================================================================
// HANDLER SERVICE
// =============================================================================

pub struct PlanTransitionService {
    pool: DieselPool,
    catalog: Arc<PlanCatalog>,
}

impl PlanTransitionService {
    pub fn new(pool: DieselPool, catalog: Arc<PlanCatalog>) -> Self {
        Self { pool, catalog }
    }

    pub async fn handle_event(
        &self,
        event: PaymentEvent,
    ) -> Result<TransitionOutcome, PlanTransitionError> {
        match event {
            PaymentEvent::CheckoutCompleted {
                customer_ref,
                subscription_ref,
                price_id,
                account_ref,
            } => {
                self.apply_checkout(customer_ref, subscription_ref, price_id, account_ref)
                    .await
            },
            PaymentEvent::SubscriptionDeleted { subscription_ref } => {
                self.revert_to_free(&subscription_ref).await
            },
            PaymentEvent::SubscriptionUpdated {
                subscription_ref,
                status,
            } => {
                if is_delinquent_status(&status) {
                    self.revert_to_free(&subscription_ref).await
                } else {
                    Ok(TransitionOutcome::NoChange)
                }
            },
        }
    }

    /// Checkout completed: write the purchased plan. Idempotent because
    /// every written value is absolute - replaying the event sets the same
    /// plan and resets the counter to the same zero.
    async fn apply_checkout(
        &self,
        customer_ref: String,
        subscription_ref: String,
        price_id: String,
        account_ref: Option<String>,
    ) -> Result<TransitionOutcome, PlanTransitionError> {
        let plan = self
            .catalog
            .plan_for_price(&price_id)
            .ok_or(PlanTransitionError::UnmappedPlanIdentifier(price_id))?;
        let limits = self.catalog.limits_for(plan);

        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| PlanTransitionError::Database(e.to_string()))?;

        let account = self
            .resolve_checkout_account(&mut conn, account_ref.as_deref(), &customer_ref)
            .await?;

        let Some(account) = account else {
            warn!(
                "Dropping checkout event: no account for customer {}",
                customer_ref
            );
            return Ok(TransitionOutcome::NoMatch);
        };

        let now = Utc::now();
        let update = PlanUpdate {
            plan: plan.as_str().to_string(),
            is_pro: limits.is_pro,
            api_calls_limit: limits.stored_api_limit(),
            api_calls_used: Some(0),
            api_calls_reset_at: Some(now),
            billing_customer_id: Some(customer_ref),
            billing_subscription_id: Some(subscription_ref),
            upgraded_at: Some(now),
            downgraded_at: None,
            updated_at: now,
        };

        let updated = User::apply_plan_update(&mut conn, account.id, update)
            .await
            .map_err(|e| PlanTransitionError::Database(e.to_string()))?;

        info!("Account {} upgraded to {}", updated.id, plan.as_str());
        Ok(TransitionOutcome::Applied {
            account_id: updated.id,
            plan,
        })
    }

    /// Cancellation and delinquency: revert to the free plan. Matched by
    /// the stored subscription reference, never by account id, because the
    /// event arrives keyed by subscription.
    async fn revert_to_free(
        &self,
        subscription_ref: &str,
    ) -> Result<TransitionOutcome, PlanTransitionError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| PlanTransitionError::Database(e.to_string()))?;

        let account = User::find_by_billing_subscription(&mut conn, subscription_ref)
            .await
            .map_err(|e| PlanTransitionError::Database(e.to_string()))?;

        let Some(account) = account else {
            warn!(
                "Dropping subscription event: no account for subscription {}",
                subscription_ref
            );
            return Ok(TransitionOutcome::NoMatch);
        };

        let now = Utc::now();
        let free_limits = self.catalog.limits_for(Plan::Free);
        let update = PlanUpdate {
            plan: Plan::Free.as_str().to_string(),
            is_pro: free_limits.is_pro,
            api_calls_limit: free_limits.stored_api_limit(),
            api_calls_used: None,
            api_calls_reset_at: None,
            billing_customer_id: None,
            billing_subscription_id: None,
            upgraded_at: None,
            downgraded_at: Some(now),
            updated_at: now,
        };

        let updated = User::apply_plan_update(&mut conn, account.id, update)
            .await
            .map_err(|e| PlanTransitionError::Database(e.to_string()))?;

        info!("Account {} reverted to free", updated.id);
        Ok(TransitionOutcome::Applied {
            account_id: updated.id,
            plan: Plan::Free,
        })
    }

    /// Checkout resolution: the client reference first, then the stored
    /// customer reference. Payment events never create accounts.
    async fn resolve_checkout_account(
        &self,
        conn: &mut diesel_async::AsyncPgConnection,
        account_ref: Option<&str>,
        customer_ref: &str,
    ) -> Result<Option<User>, PlanTransitionError> {
        if let Some(raw) = account_ref {
            if let Ok(account_id) = Uuid::parse_str(raw) {
                match User::find_by_id(conn, account_id).await {
                    Ok(account) => return Ok(Some(account)),
                    Err(UserError::NotFound) => {},
                    Err(e) => return Err(PlanTransitionError::Database(e.to_string())),
                }
            }
        }

        User::find_by_billing_customer(conn, customer_ref)
            .await
            .map_err(|e| PlanTransitionError::Database(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delinquent_statuses_revoke_access() {
        assert!(is_delinquent_status("past_due"));
        assert!(is_delinquent_status("canceled"));
        assert!(is_delinquent_status("unpaid"));
    }

    #[test]
    fn test_active_statuses_change_nothing() {
        assert!(!is_delinquent_status("active"));
        assert!(!is_delinquent_status("trialing"));
        assert!(!is_delinquent_status(""));
    }
}
