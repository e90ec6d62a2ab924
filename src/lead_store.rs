//! Persistence gateway for leads.
//!
//! Reconciliation only ever talks to a [`LeadStore`]. Production runs against
//! Postgres ([`crate::db_storage::PgLeadStore`]); [`InMemoryLeadStore`] backs
//! tests and local runs without a database.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::errors::AppError;
use crate::models::{LeadIdentity, LeadSubmission, StoredLead};

/// The three store operations reconciliation consumes.
///
/// Each call is independent; nothing here makes lookup-then-write atomic.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Returns at most one record whose phone OR email equals the identity's
    /// present fields. Absent fields never match.
    async fn find_by_identity(
        &self,
        identity: &LeadIdentity,
    ) -> Result<Option<StoredLead>, AppError>;

    /// Persists the submission as a new record and returns it with its id.
    async fn insert(&self, submission: &LeadSubmission) -> Result<StoredLead, AppError>;

    /// Overwrites record `id` with the submission's fields.
    async fn update(&self, id: i64, submission: &LeadSubmission) -> Result<(), AppError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    leads: BTreeMap<i64, StoredLead>,
}

/// Process-local lead store.
///
/// Locks per operation only, so concurrent submissions race exactly like they
/// do against Postgres.
#[derive(Debug, Default)]
pub struct InMemoryLeadStore {
    state: Mutex<MemoryState>,
}

impl InMemoryLeadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a record with a fixed id. Later inserts get ids above the highest seeded one.
    pub fn with_leads(leads: impl IntoIterator<Item = StoredLead>) -> Self {
        let store = Self::new();
        {
            let mut state = store.lock();
            for lead in leads {
                state.next_id = state.next_id.max(lead.id);
                state.leads.insert(lead.id, lead);
            }
        }
        store
    }

    pub fn get(&self, id: i64) -> Option<StoredLead> {
        self.lock().leads.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().leads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all(&self) -> Vec<StoredLead> {
        self.lock().leads.values().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl LeadStore for InMemoryLeadStore {
    async fn find_by_identity(
        &self,
        identity: &LeadIdentity,
    ) -> Result<Option<StoredLead>, AppError> {
        let state = self.lock();
        Ok(state
            .leads
            .values()
            .find(|lead| identity.matches(lead.phone_number.as_deref(), lead.email.as_deref()))
            .cloned())
    }

    async fn insert(&self, submission: &LeadSubmission) -> Result<StoredLead, AppError> {
        let mut state = self.lock();
        state.next_id += 1;
        let lead = StoredLead {
            id: state.next_id,
            phone_number: submission.phone_number.clone(),
            email: submission.email.clone(),
            created_at: submission.created_at,
            attributes: submission.attributes.clone(),
        };
        state.leads.insert(lead.id, lead.clone());
        Ok(lead)
    }

    async fn update(&self, id: i64, submission: &LeadSubmission) -> Result<(), AppError> {
        let mut state = self.lock();
        let lead = state
            .leads
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Lead with id {} not found", id)))?;
        lead.apply(submission);
        Ok(())
    }
}
