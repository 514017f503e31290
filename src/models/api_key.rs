// API key database model
// Secrets are never stored; rows hold the SHA-256 digest only

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::api_keys;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = api_keys)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ApiKey {
    pub id: Uuid,
    pub user_id: Uuid,
    pub key_hash: String,
    pub key_prefix: String,
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = api_keys)]
pub struct NewApiKey {
    pub user_id: Uuid,
    pub key_hash: String,
    pub key_prefix: String,
    pub label: String,
}

impl ApiKey {
    pub async fn insert(
        conn: &mut AsyncPgConnection,
        new_key: NewApiKey,
    ) -> Result<Self, diesel::result::Error> {
        use crate::schema::api_keys::dsl::*;

        diesel::insert_into(api_keys)
            .values(&new_key)
            .get_result::<ApiKey>(conn)
            .await
    }

    pub async fn find_by_hash(
        conn: &mut AsyncPgConnection,
        digest: &str,
    ) -> Result<Option<Self>, diesel::result::Error> {
        use crate::schema::api_keys::dsl::*;

        api_keys
            .filter(key_hash.eq(digest))
            .first::<ApiKey>(conn)
            .await
            .optional()
    }

    pub async fn list_for_user(
        conn: &mut AsyncPgConnection,
        account_id: Uuid,
    ) -> Result<Vec<Self>, diesel::result::Error> {
        use crate::schema::api_keys::dsl::*;

        api_keys
            .filter(user_id.eq(account_id))
            .order(created_at.desc())
            .load::<ApiKey>(conn)
            .await
    }

    /// Delete a key, ownership-checked. Returns whether a row was removed.
    pub async fn delete_for_user(
        conn: &mut AsyncPgConnection,
        key_id: Uuid,
        account_id: Uuid,
    ) -> Result<bool, diesel::result::Error> {
        use crate::schema::api_keys::dsl::*;

        let rows = diesel::delete(api_keys.filter(id.eq(key_id)).filter(user_id.eq(account_id)))
            .execute(conn)
            .await?;

        Ok(rows > 0)
    }

    /// Stamp last_used_at. Callers treat failures as non-fatal.
    pub async fn touch_last_used(
        conn: &mut AsyncPgConnection,
        key_id: Uuid,
    ) -> Result<(), diesel::result::Error> {
        use crate::schema::api_keys::dsl::*;

        diesel::update(api_keys.filter(id.eq(key_id)))
            .set(last_used_at.eq(Utc::now()))
            .execute(conn)
            .await?;

        Ok(())
    }
}
