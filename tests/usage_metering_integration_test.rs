// Usage metering integration tests
// Exercises the entitlement evaluator, usage recorder and plan transition
// handler against a real PostgreSQL database.
//
// Tests skip when DATABASE_URL is not set (e.g. CI without a database).

use std::sync::Arc;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::Connection;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use diesel_migrations::MigrationHarness;
use serial_test::serial;
use uuid::Uuid;

use docforge_backend::config::plans::PlanCatalog;
use docforge_backend::db::diesel_pool::MIGRATIONS;
use docforge_backend::db::DieselPool;
use docforge_backend::models::generation_event::{Channel, DocType, PostAction};
use docforge_backend::models::user::{NewUser, Plan, User};
use docforge_backend::services::entitlement::EntitlementService;
use docforge_backend::services::generation::GenerationService;
use docforge_backend::services::llm::{
    DocumentGenerator, GeneratedDocument, GenerationPrompt, GeneratorError,
};
use docforge_backend::services::plan_transition::{
    PaymentEvent, PlanTransitionService, TransitionOutcome,
};
use docforge_backend::services::pull_request::{
    PullRequestError, PullRequestOpener, PullRequestRef, PullRequestSpec,
};
use docforge_backend::services::repo_content::{
    ContentError, RepoContentProvider, RepoContext, RepoRef,
};
use docforge_backend::services::usage::UsageService;

const API_WINDOW_DAYS: i64 = 30;

// =============================================================================
// TEST SETUP
// =============================================================================

async fn setup_pool() -> Option<DieselPool> {
    dotenv::dotenv().ok();
    let url = std::env::var("DATABASE_URL").ok()?;

    // Migrations need a sync connection
    let migration_url = url.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = diesel::PgConnection::establish(&migration_url)?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| anyhow::anyhow!("migrations failed: {}", e))?;
        Ok::<_, anyhow::Error>(())
    })
    .await
    .ok()?
    .ok()?;

    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(url);
    bb8::Pool::builder().max_size(10).build(manager).await.ok()
}

fn unique_identity() -> NewUser {
    let suffix = Uuid::new_v4().simple().to_string();
    NewUser {
        github_id: format!("gh-{}", suffix),
        username: format!("user-{}", &suffix[..8]),
        display_name: None,
        email: None,
        avatar_url: None,
        plan: Plan::Free.as_str().to_string(),
    }
}

async fn create_account(pool: &DieselPool) -> User {
    let mut conn = pool.get().await.expect("pool connection");
    User::find_or_create(&mut conn, unique_identity())
        .await
        .expect("account creation")
}

async fn event_count(pool: &DieselPool, account_id: Uuid) -> i64 {
    use docforge_backend::schema::generation_events::dsl::*;

    let mut conn = pool.get().await.expect("pool connection");
    generation_events
        .filter(user_id.eq(account_id))
        .count()
        .get_result(&mut conn)
        .await
        .expect("event count")
}

async fn reload(pool: &DieselPool, account_id: Uuid) -> User {
    let mut conn = pool.get().await.expect("pool connection");
    User::find_by_id(&mut conn, account_id)
        .await
        .expect("account reload")
}

fn checkout_for(account: &User, price_id: &str, subscription_ref: &str) -> PaymentEvent {
    PaymentEvent::CheckoutCompleted {
        customer_ref: format!("cus-{}", account.github_id),
        subscription_ref: subscription_ref.to_string(),
        price_id: price_id.to_string(),
        account_ref: Some(account.id.to_string()),
    }
}

// =============================================================================
// STUB COLLABORATORS
// =============================================================================

struct StubContentProvider;

#[async_trait]
impl RepoContentProvider for StubContentProvider {
    async fn fetch_context(
        &self,
        target: &RepoRef,
        _doc_type: DocType,
    ) -> Result<RepoContext, ContentError> {
        Ok(RepoContext {
            full_name: target.full_name(),
            default_branch: "main".to_string(),
            ..Default::default()
        })
    }
}

struct StubGenerator {
    fail: bool,
}

#[async_trait]
impl DocumentGenerator for StubGenerator {
    async fn generate_document(
        &self,
        _request: GenerationPrompt,
    ) -> Result<GeneratedDocument, GeneratorError> {
        if self.fail {
            Err(GeneratorError::Request("upstream timeout".to_string()))
        } else {
            Ok(GeneratedDocument {
                content: "# Generated document".to_string(),
            })
        }
    }
}

struct StubPullRequestOpener;

#[async_trait]
impl PullRequestOpener for StubPullRequestOpener {
    async fn open_docs_pull_request(
        &self,
        _spec: &PullRequestSpec,
    ) -> Result<PullRequestRef, PullRequestError> {
        Err(PullRequestError::Request("not under test".to_string()))
    }
}

fn generation_service(pool: &DieselPool, fail_generator: bool) -> GenerationService {
    let catalog = Arc::new(PlanCatalog::default());
    GenerationService::new(
        Arc::new(EntitlementService::new(
            pool.clone(),
            catalog,
            API_WINDOW_DAYS,
        )),
        Arc::new(UsageService::new(pool.clone())),
        Arc::new(StubContentProvider),
        Arc::new(StubGenerator {
            fail: fail_generator,
        }),
        Arc::new(StubPullRequestOpener),
        "http://localhost:3000/billing".to_string(),
    )
}

// =============================================================================
// ACCOUNT LIFECYCLE
// =============================================================================

#[tokio::test]
#[serial]
async fn test_account_creation_is_idempotent() {
    let Some(pool) = setup_pool().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let identity = unique_identity();
    let mut conn = pool.get().await.unwrap();

    let first = User::find_or_create(
        &mut conn,
        NewUser {
            github_id: identity.github_id.clone(),
            username: identity.username.clone(),
            display_name: None,
            email: None,
            avatar_url: None,
            plan: Plan::Free.as_str().to_string(),
        },
    )
    .await
    .unwrap();

    let second = User::find_or_create(&mut conn, identity).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.plan, "free");
}

// =============================================================================
// WEB CHANNEL: CALENDAR-MONTH WINDOW
// =============================================================================

#[tokio::test]
#[serial]
async fn test_free_plan_web_scenario() {
    let Some(pool) = setup_pool().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let account = create_account(&pool).await;
    let catalog = Arc::new(PlanCatalog::default());
    let evaluator = EntitlementService::new(pool.clone(), catalog, API_WINDOW_DAYS);
    let recorder = UsageService::new(pool.clone());

    // First web generation of the month: allowed at 0/1
    let before = evaluator.evaluate(account.id, Channel::Web).await.unwrap();
    assert!(before.allowed);
    assert_eq!(before.usage, 0);
    assert_eq!(before.limit, 1);

    recorder
        .record_generation(account.id, DocType::Readme, "octo/demo", Channel::Web, Some(1200))
        .await
        .unwrap();

    // Second call in the same month: denied at 1/1
    let after = evaluator.evaluate(account.id, Channel::Web).await.unwrap();
    assert!(!after.allowed);
    assert_eq!(after.usage, 1);
    assert_eq!(after.limit, 1);

    // The web recording never touches the API counter
    assert_eq!(reload(&pool, account.id).await.api_calls_used, 0);

    // The free plan has no API channel at all
    let api = evaluator.evaluate(account.id, Channel::Api).await.unwrap();
    assert!(!api.allowed);
    assert_eq!(api.limit, 0);
}

// =============================================================================
// API CHANNEL: COUNTER SEMANTICS
// =============================================================================

#[tokio::test]
#[serial]
async fn test_api_channel_allows_exactly_the_limit() {
    let Some(pool) = setup_pool().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    // Fixture economics: a 3-call API plan
    let json = r#"{
        "plans": { "api_metered": { "web": 1, "api": 3, "is_pro": true } },
        "prices": { "price_fixture": "api_metered" }
    }"#;
    let catalog = Arc::new(PlanCatalog::from_env(Some(json)).unwrap());

    let account = create_account(&pool).await;
    let transitions = PlanTransitionService::new(pool.clone(), catalog.clone());
    let evaluator = EntitlementService::new(pool.clone(), catalog, API_WINDOW_DAYS);
    let recorder = UsageService::new(pool.clone());

    transitions
        .handle_event(checkout_for(&account, "price_fixture", "sub_fixture_limit"))
        .await
        .unwrap();

    for expected_usage in 0i64..3 {
        let entitlement = evaluator.evaluate(account.id, Channel::Api).await.unwrap();
        assert!(entitlement.allowed, "call {} should be allowed", expected_usage + 1);
        assert_eq!(entitlement.usage, expected_usage);
        assert_eq!(entitlement.limit, 3);

        recorder
            .record_generation(account.id, DocType::Readme, "octo/demo", Channel::Api, None)
            .await
            .unwrap();
    }

    // The fourth call is over the limit
    let denied = evaluator.evaluate(account.id, Channel::Api).await.unwrap();
    assert!(!denied.allowed);
    assert_eq!(denied.usage, 3);
    assert_eq!(denied.limit, 3);
}

#[tokio::test]
#[serial]
async fn test_concurrent_api_recordings_increment_exactly_once_each() {
    let Some(pool) = setup_pool().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    const CONCURRENCY: usize = 50;

    let account = create_account(&pool).await;
    let catalog = Arc::new(PlanCatalog::default());
    let transitions = PlanTransitionService::new(pool.clone(), catalog);

    transitions
        .handle_event(checkout_for(
            &account,
            "price_api_metered_monthly",
            "sub_concurrency",
        ))
        .await
        .unwrap();
    assert_eq!(reload(&pool, account.id).await.api_calls_used, 0);

    let recorder = Arc::new(UsageService::new(pool.clone()));
    let mut handles = Vec::with_capacity(CONCURRENCY);
    for _ in 0..CONCURRENCY {
        let recorder = recorder.clone();
        let account_id = account.id;
        handles.push(tokio::spawn(async move {
            recorder
                .record_generation(account_id, DocType::Readme, "octo/demo", Channel::Api, None)
                .await
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // N concurrent successful recordings move the counter by exactly N
    assert_eq!(
        reload(&pool, account.id).await.api_calls_used,
        CONCURRENCY as i32
    );
    assert_eq!(event_count(&pool, account.id).await, CONCURRENCY as i64);
}

// =============================================================================
// PLAN TRANSITIONS
// =============================================================================

#[tokio::test]
#[serial]
async fn test_checkout_lifts_a_denied_account_immediately() {
    let Some(pool) = setup_pool().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    // Start on a 1-call API plan and exhaust it
    let json = r#"{
        "plans": { "api_metered": { "web": 1, "api": 1, "is_pro": true } },
        "prices": {
            "price_small": "api_metered",
            "price_big": "bundle"
        }
    }"#;
    let catalog = Arc::new(PlanCatalog::from_env(Some(json)).unwrap());

    let account = create_account(&pool).await;
    let transitions = PlanTransitionService::new(pool.clone(), catalog.clone());
    let evaluator = EntitlementService::new(pool.clone(), catalog, API_WINDOW_DAYS);
    let recorder = UsageService::new(pool.clone());

    transitions
        .handle_event(checkout_for(&account, "price_small", "sub_small"))
        .await
        .unwrap();
    recorder
        .record_generation(account.id, DocType::Changelog, "octo/demo", Channel::Api, None)
        .await
        .unwrap();

    let denied = evaluator.evaluate(account.id, Channel::Api).await.unwrap();
    assert!(!denied.allowed);

    // The upgrade webhook lands; the very next evaluation allows
    transitions
        .handle_event(checkout_for(&account, "price_big", "sub_big"))
        .await
        .unwrap();

    let allowed = evaluator.evaluate(account.id, Channel::Api).await.unwrap();
    assert!(allowed.allowed);
    assert_eq!(allowed.usage, 0);
    assert_eq!(allowed.plan, Plan::Bundle);
}

#[tokio::test]
#[serial]
async fn test_checkout_replay_is_idempotent() {
    let Some(pool) = setup_pool().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let account = create_account(&pool).await;
    let catalog = Arc::new(PlanCatalog::default());
    let transitions = PlanTransitionService::new(pool.clone(), catalog);

    let event = checkout_for(&account, "price_api_metered_monthly", "sub_replay");

    transitions.handle_event(event.clone()).await.unwrap();
    let first = reload(&pool, account.id).await;

    transitions.handle_event(event).await.unwrap();
    let second = reload(&pool, account.id).await;

    assert_eq!(second.api_calls_used, 0);
    assert_eq!(first.plan, second.plan);
    assert_eq!(first.is_pro, second.is_pro);
    assert_eq!(first.api_calls_limit, second.api_calls_limit);
    assert_eq!(first.billing_customer_id, second.billing_customer_id);
    assert_eq!(first.billing_subscription_id, second.billing_subscription_id);
}

#[tokio::test]
#[serial]
async fn test_cancellation_reverts_access() {
    let Some(pool) = setup_pool().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let account = create_account(&pool).await;
    let catalog = Arc::new(PlanCatalog::default());
    let transitions = PlanTransitionService::new(pool.clone(), catalog.clone());
    let evaluator = EntitlementService::new(pool.clone(), catalog, API_WINDOW_DAYS);

    let subscription_ref = format!("sub_cancel_{}", account.github_id);
    transitions
        .handle_event(checkout_for(&account, "price_bundle_monthly", &subscription_ref))
        .await
        .unwrap();
    assert!(evaluator.evaluate(account.id, Channel::Api).await.unwrap().allowed);

    let outcome = transitions
        .handle_event(PaymentEvent::SubscriptionDeleted {
            subscription_ref: subscription_ref.clone(),
        })
        .await
        .unwrap();
    assert!(matches!(outcome, TransitionOutcome::Applied { plan: Plan::Free, .. }));

    let reverted = reload(&pool, account.id).await;
    assert_eq!(reverted.plan, "free");
    assert!(!reverted.is_pro);
    assert_eq!(reverted.api_calls_limit, 0);
    assert!(reverted.downgraded_at.is_some());

    let denied = evaluator.evaluate(account.id, Channel::Api).await.unwrap();
    assert!(!denied.allowed);
    assert_eq!(denied.limit, 0);
}

#[tokio::test]
#[serial]
async fn test_unmatched_subscription_event_is_dropped() {
    let Some(pool) = setup_pool().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let catalog = Arc::new(PlanCatalog::default());
    let transitions = PlanTransitionService::new(pool.clone(), catalog);

    let outcome = transitions
        .handle_event(PaymentEvent::SubscriptionDeleted {
            subscription_ref: format!("sub_never_seen_{}", Uuid::new_v4().simple()),
        })
        .await
        .unwrap();

    assert_eq!(outcome, TransitionOutcome::NoMatch);
}

// =============================================================================
// ORCHESTRATOR: QUOTA GATED ON SUCCESS
// =============================================================================

#[tokio::test]
#[serial]
async fn test_failed_generation_consumes_no_quota() {
    let Some(pool) = setup_pool().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let account = create_account(&pool).await;
    let service = generation_service(&pool, true);

    let result = service
        .generate(account.id, Channel::Web, DocType::Readme, "octo/demo")
        .await;
    assert!(result.is_err());

    // No ledger row, no counter change
    assert_eq!(event_count(&pool, account.id).await, 0);
    assert_eq!(reload(&pool, account.id).await.api_calls_used, 0);

    // The failed attempt did not consume the month's one free generation
    let entitlement = service.evaluate(account.id, Channel::Web).await.unwrap();
    assert!(entitlement.allowed);
    assert_eq!(entitlement.usage, 0);
}

#[tokio::test]
#[serial]
async fn test_successful_generation_records_and_reports_usage() {
    let Some(pool) = setup_pool().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let account = create_account(&pool).await;
    let service = generation_service(&pool, false);

    let output = service
        .generate(account.id, Channel::Web, DocType::Readme, "octo/demo")
        .await
        .unwrap();

    assert_eq!(output.content, "# Generated document");
    assert_eq!(output.entitlement.usage, 1);
    assert_eq!(event_count(&pool, account.id).await, 1);

    // The free plan's single web generation is now spent
    let denial = service
        .generate(account.id, Channel::Web, DocType::Readme, "octo/demo")
        .await;
    assert!(denial.is_err());
    assert_eq!(event_count(&pool, account.id).await, 1);
}

// =============================================================================
// POST-GENERATION ACTION TRACKING
// =============================================================================

#[tokio::test]
#[serial]
async fn test_action_tracking_by_id_and_fallback() {
    let Some(pool) = setup_pool().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let account = create_account(&pool).await;
    let recorder = UsageService::new(pool.clone());

    let event = recorder
        .record_generation(account.id, DocType::Readme, "octo/demo", Channel::Web, None)
        .await
        .unwrap();

    // Explicit id: flag flips once, then stays set
    let tracked = recorder
        .track_post_action(account.id, Some(event.id), "octo/demo", DocType::Readme, PostAction::Copied)
        .await
        .unwrap();
    assert!(tracked);

    let again = recorder
        .track_post_action(account.id, Some(event.id), "octo/demo", DocType::Readme, PostAction::Copied)
        .await
        .unwrap();
    assert!(!again);

    // Legacy path resolves the most recent matching event
    let downloaded = recorder
        .track_post_action(account.id, None, "octo/demo", DocType::Readme, PostAction::Downloaded)
        .await
        .unwrap();
    assert!(downloaded);

    // A stale tracking call with no matching event is a benign no-op
    let missed = recorder
        .track_post_action(account.id, None, "octo/other", DocType::License, PostAction::Copied)
        .await
        .unwrap();
    assert!(!missed);
}
