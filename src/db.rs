use sqlx::{postgres::PgPoolOptions, PgPool};

/// Idempotent schema for the leads table.
///
/// `phone_number` and `email` are indexed but not unique.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS leads (
        id BIGSERIAL PRIMARY KEY,
        phone_number TEXT,
        email TEXT,
        created_at TIMESTAMPTZ NOT NULL,
        attributes JSONB NOT NULL DEFAULT '{}'::jsonb,
        inserted_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS leads_phone_number_idx ON leads (phone_number)",
    "CREATE INDEX IF NOT EXISTS leads_email_idx ON leads (email)",
];

pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;

        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    /// Creates the leads table and its indexes if they don't exist.
    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        for statement in SCHEMA {
            sqlx::query(*statement).execute(&self.pool).await?;
        }
        tracing::debug!("Lead schema verified");
        Ok(())
    }
}
