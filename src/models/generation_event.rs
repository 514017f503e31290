// Generation ledger model
// Append-only; only the three outcome flags ever change after insert

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::schema::generation_events;

/// Document types the generator can produce
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    diesel::expression::AsExpression,
    utoipa::ToSchema,
)]
#[diesel(sql_type = diesel::sql_types::Text)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    Readme,
    Changelog,
    Contributing,
    License,
    CodeOfConduct,
    CodeComments,
    ClassDiagram,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Readme => "readme",
            DocType::Changelog => "changelog",
            DocType::Contributing => "contributing",
            DocType::License => "license",
            DocType::CodeOfConduct => "code_of_conduct",
            DocType::CodeComments => "code_comments",
            DocType::ClassDiagram => "class_diagram",
        }
    }
}

impl FromStr for DocType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "readme" => Ok(DocType::Readme),
            "changelog" => Ok(DocType::Changelog),
            "contributing" => Ok(DocType::Contributing),
            "license" => Ok(DocType::License),
            "code_of_conduct" => Ok(DocType::CodeOfConduct),
            "code_comments" => Ok(DocType::CodeComments),
            "class_diagram" => Ok(DocType::ClassDiagram),
            _ => Err(format!("Invalid doc type: {}", s)),
        }
    }
}

impl<DB> diesel::serialize::ToSql<diesel::sql_types::Text, DB> for DocType
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

/// Access path of a request
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
pub enum Channel {
    Web,
    Api,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Web => "web",
            Channel::Api => "api",
        }
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web" => Ok(Channel::Web),
            "api" => Ok(Channel::Api),
            _ => Err(format!("Invalid channel: {}", s)),
        }
    }
}

impl<DB> diesel::serialize::ToSql<diesel::sql_types::Text, DB> for Channel
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

/// Post-generation actions tracked on a ledger row
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PostAction {
    Copied,
    Downloaded,
    PrCreated,
}

/// Ledger row - queryable from database
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = generation_events)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct GenerationEvent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub doc_type: String,
    pub channel: String,
    pub target_ref: String,
    pub duration_ms: Option<i32>,
    pub copied: bool,
    pub downloaded: bool,
    pub pr_created: bool,
    pub created_at: DateTime<Utc>,
}

/// New ledger row for insertion
#[derive(Debug, Insertable)]
#[diesel(table_name = generation_events)]
pub struct NewGenerationEvent {
    pub user_id: Uuid,
    pub doc_type: DocType,
    pub channel: Channel,
    pub target_ref: String,
    pub duration_ms: Option<i32>,
}

impl GenerationEvent {
    /// Insert a new ledger row
    pub async fn insert(
        conn: &mut AsyncPgConnection,
        new_event: NewGenerationEvent,
    ) -> Result<Self, diesel::result::Error> {
        use crate::schema::generation_events::dsl::*;

        diesel::insert_into(generation_events)
            .values(&new_event)
            .get_result::<GenerationEvent>(conn)
            .await
    }

    /// Count an account's events on a channel at or after a window start
    pub async fn count_for_channel_since(
        conn: &mut AsyncPgConnection,
        account_id: Uuid,
        event_channel: Channel,
        window_start: DateTime<Utc>,
    ) -> Result<i64, diesel::result::Error> {
        use crate::schema::generation_events::dsl::*;

        generation_events
            .filter(user_id.eq(account_id))
            .filter(channel.eq(event_channel.as_str()))
            .filter(created_at.ge(window_start))
            .count()
            .get_result::<i64>(conn)
            .await
    }

    /// Set an outcome flag on a specific event, ownership-checked.
    /// The false->true guard makes the transition happen at most once.
    /// Returns whether a row was updated.
    pub async fn mark_action(
        conn: &mut AsyncPgConnection,
        event_id: Uuid,
        account_id: Uuid,
        action: PostAction,
    ) -> Result<bool, diesel::result::Error> {
        use crate::schema::generation_events::dsl::*;

        let scope = generation_events
            .filter(id.eq(event_id))
            .filter(user_id.eq(account_id));

        let rows = match action {
            PostAction::Copied => {
                diesel::update(scope.filter(copied.eq(false)))
                    .set(copied.eq(true))
                    .execute(conn)
                    .await?
            },
            PostAction::Downloaded => {
                diesel::update(scope.filter(downloaded.eq(false)))
                    .set(downloaded.eq(true))
                    .execute(conn)
                    .await?
            },
            PostAction::PrCreated => {
                diesel::update(scope.filter(pr_created.eq(false)))
                    .set(pr_created.eq(true))
                    .execute(conn)
                    .await?
            },
        };

        Ok(rows > 0)
    }

    /// Legacy lookup: the most recent event for this account, repository and
    /// doc type. Tracking calls that predate explicit event ids land here.
    pub async fn find_latest_match(
        conn: &mut AsyncPgConnection,
        account_id: Uuid,
        target: &str,
        event_doc_type: DocType,
    ) -> Result<Option<Self>, diesel::result::Error> {
        use crate::schema::generation_events::dsl::*;

        generation_events
            .filter(user_id.eq(account_id))
            .filter(target_ref.eq(target))
            .filter(doc_type.eq(event_doc_type.as_str()))
            .order(created_at.desc())
            .first::<GenerationEvent>(conn)
            .await
            .optional()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_type_conversion() {
        assert_eq!(DocType::Readme.as_str(), "readme");
        assert_eq!(DocType::CodeOfConduct.as_str(), "code_of_conduct");
        assert_eq!(DocType::from_str("class_diagram"), Ok(DocType::ClassDiagram));
        assert_eq!(DocType::from_str("changelog"), Ok(DocType::Changelog));
        assert!(DocType::from_str("wiki").is_err());
    }

    #[test]
    fn test_channel_conversion() {
        assert_eq!(Channel::Web.as_str(), "web");
        assert_eq!(Channel::Api.as_str(), "api");
        assert_eq!(Channel::from_str("web"), Ok(Channel::Web));
        assert_eq!(Channel::from_str("api"), Ok(Channel::Api));
        assert!(Channel::from_str("cli").is_err());
    }
}
