// Entitlement evaluator
// Answers "can this account perform one more generation on this channel
// right now" from live account state and the injected plan catalog.
//
// Web usage is counted from the ledger over the current calendar month
// (counted-by-query); API usage reads the persisted counter on the account
// row (counted-by-counter), which supports atomic increments under
// concurrent requests.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::config::plans::PlanCatalog;
use crate::db::DieselPool;
use crate::models::generation_event::{Channel, GenerationEvent};
use crate::models::user::{Plan, User, UserError};

// =============================================================================
// ERROR TYPES
// =============================================================================

#[derive(Debug, Error)]
pub enum EntitlementError {
    /// The authenticated identity has no account row. A data-integrity
    /// fault, surfaced hard rather than retried.
    #[error("Account not found")]
    AccountNotFound,
}

// =============================================================================
// EVALUATION RESULT
// =============================================================================

/// The evaluator's decision plus the usage/limit context callers render.
/// `limit` is -1 when the channel is unlimited; -1 is never stored.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct Entitlement {
    pub allowed: bool,
    pub usage: i64,
    pub limit: i64,
    pub plan: Plan,
    pub channel: Channel,
}

impl Entitlement {
    /// Fail-closed result used when account state cannot be read.
    fn unavailable(channel: Channel) -> Self {
        Self {
            allowed: false,
            usage: 0,
            limit: 0,
            plan: Plan::Free,
            channel,
        }
    }
}

// =============================================================================
// PURE DECISION LOGIC
// =============================================================================

/// First instant of the current calendar month, UTC. The reset boundary for
/// web usage; deterministic for every evaluation within the same month.
pub fn month_window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .expect("first instant of a month is unambiguous in UTC")
}

/// The allow/deny rule. `limit` of -1 means unlimited, 0 means the plan
/// does not include the channel; otherwise strict less-than.
pub fn decide(limit: i64, usage: i64) -> bool {
    match limit {
        -1 => true,
        0 => false,
        n => usage < n,
    }
}

// =============================================================================
// EVALUATOR SERVICE
// =============================================================================

pub struct EntitlementService {
    pool: DieselPool,
    catalog: Arc<PlanCatalog>,
    api_window: Duration,
}

impl EntitlementService {
    pub fn new(pool: DieselPool, catalog: Arc<PlanCatalog>, api_window_days: i64) -> Self {
        Self {
            pool,
            catalog,
            api_window: Duration::days(api_window_days),
        }
    }

    pub fn catalog(&self) -> &PlanCatalog {
        &self.catalog
    }

    /// Evaluate one more generation for an account on a channel.
    ///
    /// Storage failures evaluate to a denial (fail closed, never open); a
    /// missing account is the one hard error.
    pub async fn evaluate(
        &self,
        account_id: Uuid,
        channel: Channel,
    ) -> Result<Entitlement, EntitlementError> {
        let mut conn = match self.pool.get().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Entitlement check failing closed, pool error: {}", e);
                return Ok(Entitlement::unavailable(channel));
            },
        };

        // Always read live account state; plan changes apply on the very
        // next evaluation.
        let account = match User::find_by_id(&mut conn, account_id).await {
            Ok(account) => account,
            Err(UserError::NotFound) => return Err(EntitlementError::AccountNotFound),
            Err(e) => {
                warn!(
                    "Entitlement check failing closed for {}: {}",
                    account_id, e
                );
                return Ok(Entitlement::unavailable(channel));
            },
        };

        if !account.is_active {
            return Ok(Entitlement {
                allowed: false,
                usage: 0,
                limit: 0,
                plan: account.plan_enum(),
                channel,
            });
        }

        match channel {
            Channel::Web => self.evaluate_web(&mut conn, &account).await,
            Channel::Api => self.evaluate_api(&mut conn, account).await,
        }
    }

    /// Web usage: counted live from the ledger over the calendar month.
    async fn evaluate_web(
        &self,
        conn: &mut diesel_async::AsyncPgConnection,
        account: &User,
    ) -> Result<Entitlement, EntitlementError> {
        let plan = account.plan_enum();
        let limit = self.catalog.limits_for(plan).reported_limit(Channel::Web);

        let window_start = month_window_start(Utc::now());
        let usage = match GenerationEvent::count_for_channel_since(
            conn,
            account.id,
            Channel::Web,
            window_start,
        )
        .await
        {
            Ok(count) => count,
            Err(e) => {
                warn!(
                    "Entitlement check failing closed for {}: {}",
                    account.id, e
                );
                return Ok(Entitlement::unavailable(Channel::Web));
            },
        };

        Ok(Entitlement {
            allowed: decide(limit, usage),
            usage,
            limit,
            plan,
            channel: Channel::Web,
        })
    }

    /// API usage: the persisted counter against the persisted limit, with a
    /// lazy roll of the metering window when it has elapsed.
    async fn evaluate_api(
        &self,
        conn: &mut diesel_async::AsyncPgConnection,
        account: User,
    ) -> Result<Entitlement, EntitlementError> {
        let plan = account.plan_enum();
        let now = Utc::now();

        let mut usage = account.api_calls_used as i64;
        if account.api_calls_reset_at + self.api_window <= now {
            match User::reset_api_window_if_due(conn, account.id, self.api_window, now).await {
                // Whoever won the guarded reset, the counter is now zero.
                Ok(_) => usage = 0,
                Err(e) => {
                    warn!(
                        "Entitlement check failing closed for {}: {}",
                        account.id, e
                    );
                    return Ok(Entitlement::unavailable(Channel::Api));
                },
            }
        }

        let limit = account.api_calls_limit as i64;

        Ok(Entitlement {
            allowed: decide(limit, usage),
            usage,
            limit,
            plan,
            channel: Channel::Api,
        })
    }
}
