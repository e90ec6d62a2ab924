use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};

use crate::errors::{AppError, ResultExt};
use crate::lead_store::LeadStore;
use crate::models::{LeadIdentity, LeadSubmission, StoredLead};

/// Row shape of the `leads` table.
#[derive(Debug, FromRow)]
struct LeadRow {
    id: i64,
    phone_number: Option<String>,
    email: Option<String>,
    created_at: DateTime<Utc>,
    attributes: Json<Map<String, Value>>,
}

impl From<LeadRow> for StoredLead {
    fn from(row: LeadRow) -> Self {
        Self {
            id: row.id,
            phone_number: row.phone_number,
            email: row.email,
            created_at: row.created_at,
            attributes: row.attributes.0,
        }
    }
}

/// Postgres-backed lead store.
#[derive(Clone)]
pub struct PgLeadStore {
    pool: PgPool,
}

impl PgLeadStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeadStore for PgLeadStore {
    async fn find_by_identity(
        &self,
        identity: &LeadIdentity,
    ) -> Result<Option<StoredLead>, AppError> {
        // NULL parameters compare as unknown, so absent identity fields never match.
        let row = sqlx::query_as::<_, LeadRow>(
            r#"
            SELECT id, phone_number, email, created_at, attributes
            FROM leads
            WHERE phone_number = $1 OR email = $2
            ORDER BY id ASC
            LIMIT 1
            "#,
        )
        .bind(identity.phone_number.as_deref())
        .bind(identity.email.as_deref())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query leads by phone/email")?;

        Ok(row.map(StoredLead::from))
    }

    async fn insert(&self, submission: &LeadSubmission) -> Result<StoredLead, AppError> {
        let row = sqlx::query_as::<_, LeadRow>(
            r#"
            INSERT INTO leads (phone_number, email, created_at, attributes)
            VALUES ($1, $2, $3, $4)
            RETURNING id, phone_number, email, created_at, attributes
            "#,
        )
        .bind(submission.phone_number.as_deref())
        .bind(submission.email.as_deref())
        .bind(submission.created_at)
        .bind(Json(&submission.attributes))
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert lead")?;

        tracing::debug!("Inserted lead row id={}", row.id);
        Ok(row.into())
    }

    async fn update(&self, id: i64, submission: &LeadSubmission) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE leads
            SET phone_number = COALESCE($2, phone_number),
                email = COALESCE($3, email),
                created_at = $4,
                attributes = attributes || $5,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(submission.phone_number.as_deref())
        .bind(submission.email.as_deref())
        .bind(submission.created_at)
        .bind(Json(&submission.attributes))
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to update lead {}", id))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Lead with id {} not found", id)));
        }

        Ok(())
    }
}
