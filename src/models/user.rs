// Account database model
// One row per GitHub identity; plan and counters drive entitlement decisions

use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::schema::users;

/// Plan enumeration matching the pricing structure
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    diesel::expression::AsExpression,
    utoipa::ToSchema,
)]
#[diesel(sql_type = diesel::sql_types::Text)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    Free,         // $0 - 1 web generation/month, no API
    WebUnlimited, // Unlimited web generations, no API
    ApiMetered,   // 1 web generation/month + metered API calls
    Bundle,       // Unlimited web + metered API calls
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::WebUnlimited => "web_unlimited",
            Plan::ApiMetered => "api_metered",
            Plan::Bundle => "bundle",
        }
    }
}

impl FromStr for Plan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Plan::Free),
            "web_unlimited" => Ok(Plan::WebUnlimited),
            "api_metered" => Ok(Plan::ApiMetered),
            "bundle" => Ok(Plan::Bundle),
            _ => Err(format!("Invalid plan: {}", s)),
        }
    }
}

impl<DB> diesel::deserialize::FromSql<diesel::sql_types::Text, DB> for Plan
where
    DB: diesel::backend::Backend,
    String: diesel::deserialize::FromSql<diesel::sql_types::Text, DB>,
{
    fn from_sql(bytes: DB::RawValue<'_>) -> diesel::deserialize::Result<Self> {
        let value = String::from_sql(bytes)?;
        Self::from_str(&value).map_err(|e| e.into())
    }
}

impl<DB> diesel::serialize::ToSql<diesel::sql_types::Text, DB> for Plan
where
    DB: diesel::backend::Backend,
    str: diesel::serialize::ToSql<diesel::sql_types::Text, DB>,
{
    fn to_sql<'b>(
        &'b self,
        out: &mut diesel::serialize::Output<'b, '_, DB>,
    ) -> diesel::serialize::Result {
        self.as_str().to_sql(out)
    }
}

/// Account database model - queryable from database
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    pub id: Uuid,
    pub github_id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub plan: String, // Will convert to enum
    pub is_pro: bool,
    pub is_admin: bool,
    pub survey_completed: bool,
    pub api_calls_used: i32,
    pub api_calls_limit: i32,
    pub api_calls_reset_at: DateTime<Utc>,
    pub billing_customer_id: Option<String>,
    pub billing_subscription_id: Option<String>,
    pub upgraded_at: Option<DateTime<Utc>>,
    pub downgraded_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New account for insertion
#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub github_id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub plan: String,
}

/// Plan transition write, scoped to the fields the webhook handler owns.
/// The usage counter only ever appears here as an absolute reset.
#[derive(Debug, AsChangeset)]
#[diesel(table_name = users)]
pub struct PlanUpdate {
    pub plan: String,
    pub is_pro: bool,
    pub api_calls_limit: i32,
    pub api_calls_used: Option<i32>,
    pub api_calls_reset_at: Option<DateTime<Utc>>,
    pub billing_customer_id: Option<String>,
    pub billing_subscription_id: Option<String>,
    pub upgraded_at: Option<DateTime<Utc>>,
    pub downgraded_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Errors for account operations
#[derive(thiserror::Error, Debug)]
pub enum UserError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Account not found")]
    NotFound,

    #[error("Connection pool error")]
    Pool(String),
}

impl User {
    /// Find account by ID
    pub async fn find_by_id(
        conn: &mut AsyncPgConnection,
        account_id: Uuid,
    ) -> Result<Self, UserError> {
        use crate::schema::users::dsl::*;

        users
            .filter(id.eq(account_id))
            .first::<User>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => UserError::NotFound,
                _ => UserError::Database(e),
            })
    }

    /// Find account by external identity
    pub async fn find_by_github_id(
        conn: &mut AsyncPgConnection,
        external_id: &str,
    ) -> Result<Self, UserError> {
        use crate::schema::users::dsl::*;

        users
            .filter(github_id.eq(external_id))
            .first::<User>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => UserError::NotFound,
                _ => UserError::Database(e),
            })
    }

    /// Find account by stored billing subscription reference
    pub async fn find_by_billing_subscription(
        conn: &mut AsyncPgConnection,
        subscription_ref: &str,
    ) -> Result<Option<Self>, UserError> {
        use crate::schema::users::dsl::*;

        users
            .filter(billing_subscription_id.eq(subscription_ref))
            .first::<User>(conn)
            .await
            .optional()
            .map_err(UserError::Database)
    }

    /// Find account by stored billing customer reference
    pub async fn find_by_billing_customer(
        conn: &mut AsyncPgConnection,
        customer_ref: &str,
    ) -> Result<Option<Self>, UserError> {
        use crate::schema::users::dsl::*;

        users
            .filter(billing_customer_id.eq(customer_ref))
            .first::<User>(conn)
            .await
            .optional()
            .map_err(UserError::Database)
    }

    /// Create the account for an external identity, or return the existing
    /// row. Idempotent: concurrent first logins race on the github_id unique
    /// constraint and both resolve to the same account.
    pub async fn find_or_create(
        conn: &mut AsyncPgConnection,
        new_user: NewUser,
    ) -> Result<Self, UserError> {
        use crate::schema::users::dsl::*;

        if let Ok(existing) = Self::find_by_github_id(conn, &new_user.github_id).await {
            return Ok(existing);
        }

        let inserted = diesel::insert_into(users)
            .values(&new_user)
            .on_conflict(github_id)
            .do_nothing()
            .get_result::<User>(conn)
            .await
            .optional()
            .map_err(UserError::Database)?;

        match inserted {
            Some(user) => Ok(user),
            // Lost the race; the other writer's row is authoritative.
            None => Self::find_by_github_id(conn, &new_user.github_id).await,
        }
    }

    /// Atomically increment the API usage counter.
    /// Single UPDATE statement so concurrent increments never lose updates.
    pub async fn increment_api_usage(
        conn: &mut AsyncPgConnection,
        account_id: Uuid,
    ) -> Result<(), diesel::result::Error> {
        use crate::schema::users::dsl::*;

        let rows = diesel::update(users.filter(id.eq(account_id)))
            .set((
                api_calls_used.eq(api_calls_used + 1),
                updated_at.eq(Utc::now()),
            ))
            .execute(conn)
            .await?;

        if rows == 0 {
            return Err(diesel::result::Error::NotFound);
        }
        Ok(())
    }

    /// Roll the API metering window if it has elapsed. Guarded on the stored
    /// reset timestamp so concurrent evaluations reset at most once.
    /// Returns true if this call performed the reset.
    pub async fn reset_api_window_if_due(
        conn: &mut AsyncPgConnection,
        account_id: Uuid,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, UserError> {
        use crate::schema::users::dsl::*;

        let cutoff = now - window;
        let rows = diesel::update(
            users
                .filter(id.eq(account_id))
                .filter(api_calls_reset_at.le(cutoff)),
        )
        .set((
            api_calls_used.eq(0),
            api_calls_reset_at.eq(now),
            updated_at.eq(now),
        ))
        .execute(conn)
        .await
        .map_err(UserError::Database)?;

        Ok(rows > 0)
    }

    /// Apply a plan transition. Only the webhook handler writes these fields.
    pub async fn apply_plan_update(
        conn: &mut AsyncPgConnection,
        account_id: Uuid,
        update: PlanUpdate,
    ) -> Result<Self, UserError> {
        use crate::schema::users::dsl::*;

        diesel::update(users.filter(id.eq(account_id)))
            .set(&update)
            .get_result::<User>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => UserError::NotFound,
                _ => UserError::Database(e),
            })
    }

    /// Get the account's plan as enum
    pub fn plan_enum(&self) -> Plan {
        Plan::from_str(&self.plan).unwrap_or_else(|e| {
            tracing::warn!(
                "Invalid plan '{}' for account {}, defaulting to Free: {}",
                self.plan,
                self.id,
                e
            );
            Plan::Free
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_conversion() {
        assert_eq!(Plan::Free.as_str(), "free");
        assert_eq!(Plan::WebUnlimited.as_str(), "web_unlimited");
        assert_eq!(Plan::ApiMetered.as_str(), "api_metered");
        assert_eq!(Plan::Bundle.as_str(), "bundle");

        assert_eq!(Plan::from_str("free"), Ok(Plan::Free));
        assert_eq!(Plan::from_str("bundle"), Ok(Plan::Bundle));
        assert!(Plan::from_str("enterprise").is_err());
    }

    #[test]
    fn test_plan_enum_defaults_to_free_on_bad_data() {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            github_id: "1234".to_string(),
            username: "octocat".to_string(),
            display_name: None,
            email: None,
            avatar_url: None,
            plan: "not-a-plan".to_string(),
            is_pro: false,
            is_admin: false,
            survey_completed: false,
            api_calls_used: 0,
            api_calls_limit: 0,
            api_calls_reset_at: now,
            billing_customer_id: None,
            billing_subscription_id: None,
            upgraded_at: None,
            downgraded_at: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        assert_eq!(user.plan_enum(), Plan::Free);
    }
}
