use chrono::{Duration, TimeZone, Utc};
use serde_json::{json, Value};
use std::env;
use uuid::Uuid;

use lead_intake_api::data::db_storage::PgLeadStore;
use lead_intake_api::db::Database;
use lead_intake_api::lead_store::LeadStore;
use lead_intake_api::models::{LeadIdentity, LeadPayload, ReconcileOutcome, StoredLead};
use lead_intake_api::reconciliation::{reconcile_payload, IntakeContext};

async fn connect() -> anyhow::Result<Database> {
    let db_url = env::var("TEST_DATABASE_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .map_err(|_| anyhow::anyhow!("Set TEST_DATABASE_URL or DATABASE_URL to run this test"))?;

    Database::new(&db_url, 2).await
}

fn payload(value: Value) -> LeadPayload {
    match value {
        Value::Object(map) => map,
        other => panic!("expected JSON object, got {}", other),
    }
}

/// Unique identity so repeated runs don't collide.
fn unique_email() -> String {
    format!("smoke-{}@example.com", Uuid::new_v4().simple())
}

async fn reconcile(
    store: &PgLeadStore,
    ctx: &IntakeContext,
    value: Value,
) -> anyhow::Result<ReconcileOutcome> {
    reconcile_payload(store, ctx, payload(value))
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))
}

async fn load(store: &PgLeadStore, email: &str) -> anyhow::Result<StoredLead> {
    store
        .find_by_identity(&LeadIdentity::new(None, Some(email)))
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .ok_or_else(|| anyhow::anyhow!("lead {} not found", email))
}

async fn cleanup(db: &Database, id: i64) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM leads WHERE id = $1")
        .bind(id)
        .execute(&db.pool)
        .await?;
    Ok(())
}

/// Integration smoke test for reconciliation against Postgres.
/// Marked ignored to avoid running against production by accident; set TEST_DATABASE_URL to run.
#[tokio::test]
#[ignore]
async fn reconcile_against_postgres_smoke_test() -> anyhow::Result<()> {
    let db = connect().await?;
    let store = PgLeadStore::new(db.pool.clone());
    let ctx = IntakeContext::new("integration_test");

    let email = unique_email();
    let t0 = Utc.with_ymd_and_hms(2025, 2, 1, 12, 0, 0).unwrap();
    let at = |offset: Duration| (t0 + offset).to_rfc3339();

    let first = reconcile(
        &store,
        &ctx,
        json!({"email": email, "created_at": at(Duration::zero()), "stage": "new", "city": "Pune"}),
    )
    .await?;
    let ReconcileOutcome::Inserted { id } = first else {
        anyhow::bail!("expected insert, got {:?}", first);
    };

    let same_time = reconcile(
        &store,
        &ctx,
        json!({"email": email, "created_at": at(Duration::zero()), "stage": "lost"}),
    )
    .await?;
    assert_eq!(same_time, ReconcileOutcome::ignored());

    let newer = reconcile(
        &store,
        &ctx,
        json!({"email": email, "created_at": at(Duration::hours(2)), "stage": "contacted"}),
    )
    .await?;
    assert_eq!(newer, ReconcileOutcome::Updated { id });

    let older = reconcile(
        &store,
        &ctx,
        json!({"email": email, "created_at": at(Duration::hours(1)), "stage": "lost"}),
    )
    .await?;
    assert_eq!(older, ReconcileOutcome::ignored());

    let stored = load(&store, &email).await?;
    assert_eq!(stored.id, id);
    assert_eq!(stored.created_at, t0 + Duration::hours(2));
    assert_eq!(stored.attributes["stage"], json!("contacted"));
    assert_eq!(stored.attributes["city"], json!("Pune"));

    cleanup(&db, id).await
}

#[tokio::test]
#[ignore]
async fn postgres_round_trip_keeps_arbiter_stable() -> anyhow::Result<()> {
    let db = connect().await?;
    let store = PgLeadStore::new(db.pool.clone());
    let ctx = IntakeContext::new("integration_test");

    let email = unique_email();
    let phone = format!("9{:09}", Uuid::new_v4().as_u128() % 1_000_000_000);

    // Nanosecond precision in the payload; the column keeps microseconds.
    let lead = json!({
        "phone_number": phone,
        "email": email,
        "created_at": "2025-02-01T12:00:00.123456789Z"
    });

    let first = reconcile(&store, &ctx, lead.clone()).await?;
    let ReconcileOutcome::Inserted { id } = first else {
        anyhow::bail!("expected insert, got {:?}", first);
    };
    assert_eq!(reconcile(&store, &ctx, lead).await?, ReconcileOutcome::ignored());

    let stored = load(&store, &email).await?;
    assert_eq!(stored.created_at.timestamp_subsec_nanos(), 123_456_000);

    // Update through the phone only: email is kept, attributes merge per key.
    let update = reconcile(
        &store,
        &ctx,
        json!({
            "phone_number": phone,
            "created_at": "2025-02-01T12:00:00.123457Z",
            "stage": "qualified"
        }),
    )
    .await?;
    assert_eq!(update, ReconcileOutcome::Updated { id });

    let stored = load(&store, &email).await?;
    assert_eq!(stored.email.as_deref(), Some(email.as_str()));
    assert_eq!(stored.phone_number.as_deref(), Some(phone.as_str()));
    assert_eq!(stored.attributes["stage"], json!("qualified"));
    assert_eq!(stored.created_at.timestamp_subsec_nanos(), 123_457_000);

    cleanup(&db, id).await
}
