/// Lead intake reconciliation
///
/// Decides, for each submitted lead, whether to insert a new record, overwrite
/// an existing one, or drop the submission as a stale duplicate:
/// 1. Match an existing record by phone OR email
/// 2. Arbitrate by `created_at` (strictly newer wins, ties keep the stored record)
/// 3. Perform at most one write
///
/// The lookup and the write are separate store calls. Two concurrent
/// submissions for a brand-new identity can both miss and both insert.
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::errors::AppError;
use crate::lead_store::LeadStore;
use crate::models::{
    to_storage_precision, LeadPayload, LeadSubmission, ReconcileOutcome, StoredLead,
};
use crate::validation;

/// Caller-supplied context for one intake request.
#[derive(Debug, Clone)]
pub struct IntakeContext {
    /// Correlates log lines for one request.
    pub request_id: Uuid,
    /// Dealer that captured the lead, when known.
    pub dealer_id: Option<String>,
    /// Channel the lead came through (web form, import, walk-in, ...).
    pub source: String,
    /// When the service received the current submission; default for a missing
    /// `created_at`. Microsecond precision.
    pub received_at: DateTime<Utc>,
}

impl IntakeContext {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            dealer_id: None,
            source: source.into(),
            received_at: to_storage_precision(Utc::now()),
        }
    }

    /// Stamps the receipt time of the next item in a multi-item request.
    ///
    /// Stamps strictly increase, so a later item for the same identity without
    /// its own `created_at` is newer than the one before it.
    pub fn stamp_receipt(&mut self) {
        let now = to_storage_precision(Utc::now());
        self.received_at = now.max(self.received_at + Duration::microseconds(1));
    }

    pub fn with_dealer(mut self, dealer_id: Option<String>) -> Self {
        self.dealer_id = dealer_id;
        self
    }
}

/// What the arbiter decided for a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// No existing match.
    Insert,
    /// Existing record `id` is older than the submission.
    Update { id: i64 },
    /// Existing record is as new or newer.
    Ignore { id: i64 },
}

/// Pure recency rule over (existing record, new submission).
pub fn arbitrate(existing: Option<&StoredLead>, submission: &LeadSubmission) -> Decision {
    match existing {
        None => Decision::Insert,
        Some(stored) if submission.created_at > stored.created_at => {
            Decision::Update { id: stored.id }
        }
        Some(stored) => Decision::Ignore { id: stored.id },
    }
}

/// Reconcile one parsed submission against the store.
///
/// Store failures are wrapped with the phase that produced them and returned
/// as-is: nothing is retried here.
pub async fn reconcile_lead(
    store: &dyn LeadStore,
    ctx: &IntakeContext,
    submission: &LeadSubmission,
) -> Result<ReconcileOutcome, AppError> {
    let identity = submission.identity();
    if identity.is_empty() {
        return Err(AppError::BadRequest(
            "At least one identifier required (phone_number or email)".to_string(),
        ));
    }

    validation::warn_on_suspicious_contacts(submission);

    tracing::debug!(
        request_id = %ctx.request_id,
        "Looking up lead by phone={:?} email={:?}",
        identity.phone_number,
        identity.email
    );

    let existing = store
        .find_by_identity(&identity)
        .await
        .map_err(|e| AppError::LookupFailure(Box::new(e)))?;

    let outcome = match arbitrate(existing.as_ref(), submission) {
        Decision::Insert => {
            let stored = store
                .insert(submission)
                .await
                .map_err(|e| AppError::InsertFailure(Box::new(e)))?;
            ReconcileOutcome::Inserted { id: stored.id }
        }
        Decision::Update { id } => {
            store
                .update(id, submission)
                .await
                .map_err(|e| AppError::UpdateFailure(Box::new(e)))?;
            ReconcileOutcome::Updated { id }
        }
        Decision::Ignore { id } => {
            tracing::debug!(
                request_id = %ctx.request_id,
                "Submission at {} is not newer than lead {}",
                submission.created_at,
                id
            );
            ReconcileOutcome::ignored()
        }
    };

    tracing::info!(
        request_id = %ctx.request_id,
        dealer_id = ctx.dealer_id.as_deref().unwrap_or("-"),
        source = %ctx.source,
        "Lead {}",
        outcome.label()
    );

    Ok(outcome)
}

/// Parse a raw payload and reconcile it.
pub async fn reconcile_payload(
    store: &dyn LeadStore,
    ctx: &IntakeContext,
    payload: LeadPayload,
) -> Result<ReconcileOutcome, AppError> {
    let submission = LeadSubmission::from_payload(payload, ctx.received_at)?;
    let outcome = reconcile_lead(store, ctx, &submission).await?;
    Ok(outcome)
}
