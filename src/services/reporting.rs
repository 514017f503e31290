// Read-only reporting over the generation ledger
// Feeds the admin dashboard; never participates in entitlement decisions.

use chrono::{Duration, Utc};
use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::sql_types::{Double, Nullable};
use diesel_async::RunQueryDsl;
use serde::Serialize;
use thiserror::Error;

use crate::db::DieselPool;

#[derive(Debug, Error)]
pub enum ReportingError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Connection pool error: {0}")]
    Pool(String),
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CountRow {
    pub key: String,
    pub count: i64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UsageReport {
    pub window_days: i64,
    pub total_generations: i64,
    pub by_doc_type: Vec<CountRow>,
    pub by_channel: Vec<CountRow>,
    pub copied: i64,
    pub downloaded: i64,
    pub prs_created: i64,
    pub avg_duration_ms: Option<f64>,
}

pub struct ReportingService {
    pool: DieselPool,
}

impl ReportingService {
    pub fn new(pool: DieselPool) -> Self {
        Self { pool }
    }

    /// Aggregate ledger activity over a trailing window.
    pub async fn usage_report(&self, window_days: i64) -> Result<UsageReport, ReportingError> {
        use crate::schema::generation_events::dsl::*;

        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| ReportingError::Pool(e.to_string()))?;

        let since = Utc::now() - Duration::days(window_days);

        let total_generations: i64 = generation_events
            .filter(created_at.ge(since))
            .count()
            .get_result(&mut conn)
            .await?;

        let by_doc_type: Vec<(String, i64)> = generation_events
            .filter(created_at.ge(since))
            .group_by(doc_type)
            .select((doc_type, diesel::dsl::count_star()))
            .load(&mut conn)
            .await?;

        let by_channel: Vec<(String, i64)> = generation_events
            .filter(created_at.ge(since))
            .group_by(channel)
            .select((channel, diesel::dsl::count_star()))
            .load(&mut conn)
            .await?;

        let copied_count: i64 = generation_events
            .filter(created_at.ge(since))
            .filter(copied.eq(true))
            .count()
            .get_result(&mut conn)
            .await?;

        let downloaded_count: i64 = generation_events
            .filter(created_at.ge(since))
            .filter(downloaded.eq(true))
            .count()
            .get_result(&mut conn)
            .await?;

        let pr_count: i64 = generation_events
            .filter(created_at.ge(since))
            .filter(pr_created.eq(true))
            .count()
            .get_result(&mut conn)
            .await?;

        let avg_duration_ms: Option<f64> = generation_events
            .filter(created_at.ge(since))
            .select(sql::<Nullable<Double>>("AVG(duration_ms)::float8"))
            .get_result(&mut conn)
            .await?;

        Ok(UsageReport {
            window_days,
            total_generations,
            by_doc_type: by_doc_type
                .into_iter()
                .map(|(key, count)| CountRow { key, count })
                .collect(),
            by_channel: by_channel
                .into_iter()
                .map(|(key, count)| CountRow { key, count })
                .collect(),
            copied: copied_count,
            downloaded: downloaded_count,
            prs_created: pr_count,
            avg_duration_ms,
        })
    }
}
