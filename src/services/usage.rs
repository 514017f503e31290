// Usage recorder
// The single write path invoked after a generation has genuinely completed.
// Never called speculatively: a failed generation leaves no trace here.

use thiserror::Error;
use uuid::Uuid;

use crate::db::DieselPool;
use crate::models::generation_event::{
    Channel, DocType, GenerationEvent, NewGenerationEvent, PostAction,
};
use crate::models::user::User;

#[derive(Debug, Error)]
pub enum UsageError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Connection pool error: {0}")]
    Pool(String),
}

pub struct UsageService {
    pool: DieselPool,
}

impl UsageService {
    pub fn new(pool: DieselPool) -> Self {
        Self { pool }
    }

    /// Record one successful generation: insert the ledger row and, for the
    /// API channel, atomically bump the account's usage counter. Both writes
    /// commit together or not at all.
    pub async fn record_generation(
        &self,
        account_id: Uuid,
        doc_type: DocType,
        target_ref: &str,
        channel: Channel,
        duration_ms: Option<i32>,
    ) -> Result<GenerationEvent, UsageError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| UsageError::Pool(e.to_string()))?;

        let target = target_ref.to_string();

        let event = conn
            .build_transaction()
            .run::<GenerationEvent, diesel::result::Error, _>(|conn| {
                Box::pin(async move {
                    let event = GenerationEvent::insert(
                        conn,
                        NewGenerationEvent {
                            user_id: account_id,
                            doc_type,
                            channel,
                            target_ref: target,
                            duration_ms,
                        },
                    )
                    .await?;

                    if channel == Channel::Api {
                        User::increment_api_usage(conn, account_id).await?;
                    }

                    Ok(event)
                })
            })
            .await?;

        Ok(event)
    }

    /// Mark a post-generation action on a ledger row.
    ///
    /// Preferred path: the caller supplies the event id returned with the
    /// generation. Legacy callers without an id fall back to the most
    /// recent matching event for the account/repository/doc-type.
    /// A miss (or an already-set flag) is a benign no-op: `tracked` is
    /// false but the call succeeds.
    pub async fn track_post_action(
        &self,
        account_id: Uuid,
        event_id: Option<Uuid>,
        target_ref: &str,
        doc_type: DocType,
        action: PostAction,
    ) -> Result<bool, UsageError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| UsageError::Pool(e.to_string()))?;

        let resolved_id = match event_id {
            Some(id) => Some(id),
            None => {
                GenerationEvent::find_latest_match(&mut conn, account_id, target_ref, doc_type)
                    .await?
                    .map(|event| event.id)
            },
        };

        match resolved_id {
            Some(id) => {
                let tracked = GenerationEvent::mark_action(&mut conn, id, account_id, action).await?;
                Ok(tracked)
            },
            None => Ok(false),
        }
    }
}
