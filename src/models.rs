use chrono::{DateTime, SubsecRound, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::{IntoParams, ToSchema};

use crate::errors::AppError;

/// Reason reported when a submission is discarded as a stale duplicate.
pub const OLDER_DUPLICATE: &str = "older duplicate";

pub const PHONE_FIELD: &str = "phone_number";
pub const EMAIL_FIELD: &str = "email";
pub const CREATED_AT_FIELD: &str = "created_at";

/// Keys the store owns; they are never carried as attributes.
const RESERVED_FIELDS: &[&str] = &["id"];

/// Raw lead payload as received: field name to value.
pub type LeadPayload = Map<String, Value>;

// ============ Identity ============

/// Identity candidates of a lead. Either field may match an existing record.
///
/// Blank values are normalized to `None` so that they never take part in matching.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LeadIdentity {
    /// Phone number as submitted (trimmed).
    pub phone_number: Option<String>,
    /// Email address as submitted (trimmed).
    pub email: Option<String>,
}

impl LeadIdentity {
    pub fn new(phone_number: Option<&str>, email: Option<&str>) -> Self {
        Self {
            phone_number: non_blank(phone_number),
            email: non_blank(email),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.phone_number.is_none() && self.email.is_none()
    }

    /// True when `phone_number` or `email` equals the corresponding identity field.
    pub fn matches(&self, phone_number: Option<&str>, email: Option<&str>) -> bool {
        let phone_hit = matches!(
            (self.phone_number.as_deref(), phone_number),
            (Some(a), Some(b)) if a == b
        );
        let email_hit = matches!(
            (self.email.as_deref(), email),
            (Some(a), Some(b)) if a == b
        );
        phone_hit || email_hit
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

// ============ Submission ============

/// A newly submitted lead, split into its typed keys and an open attribute bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LeadSubmission {
    pub phone_number: Option<String>,
    pub email: Option<String>,
    /// When this submission was generated.
    pub created_at: DateTime<Utc>,
    /// Every other field (name, source, stage, product interest, pincode, ...).
    #[schema(value_type = Object)]
    pub attributes: Map<String, Value>,
}

impl LeadSubmission {
    /// Builds a submission from a raw payload.
    ///
    /// `received_at` is used when the payload carries no `created_at`.
    /// Fails with `BadRequest` when a typed key has the wrong JSON type or when
    /// neither phone nor email is present.
    pub fn from_payload(
        mut payload: LeadPayload,
        received_at: DateTime<Utc>,
    ) -> Result<Self, AppError> {
        let phone_number = take_string(&mut payload, PHONE_FIELD)?;
        let email = take_string(&mut payload, EMAIL_FIELD)?;
        let created_at = to_storage_precision(match payload.remove(CREATED_AT_FIELD) {
            None | Some(Value::Null) => received_at,
            Some(value) => parse_created_at(&value)?,
        });

        for key in RESERVED_FIELDS {
            if payload.remove(*key).is_some() {
                tracing::debug!("Dropped store-owned field '{}' from submission", key);
            }
        }

        let identity = LeadIdentity::new(phone_number.as_deref(), email.as_deref());
        if identity.is_empty() {
            return Err(AppError::BadRequest(
                "At least one identifier required (phone_number or email)".to_string(),
            ));
        }

        Ok(Self {
            phone_number: identity.phone_number,
            email: identity.email,
            created_at,
            attributes: payload,
        })
    }

    pub fn identity(&self) -> LeadIdentity {
        LeadIdentity::new(self.phone_number.as_deref(), self.email.as_deref())
    }
}

fn take_string(payload: &mut LeadPayload, key: &str) -> Result<Option<String>, AppError> {
    match payload.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        // Numeric phone numbers show up from spreadsheet imports.
        Some(Value::Number(n)) if key == PHONE_FIELD => Ok(Some(n.to_string())),
        Some(other) => Err(AppError::BadRequest(format!(
            "Field '{}' must be a string, got {}",
            key, other
        ))),
    }
}

/// Truncates to whole microseconds, the precision a `TIMESTAMPTZ` column keeps.
///
/// Every timestamp the arbiter compares goes through here, so a record read back
/// from Postgres compares equal to the submission that wrote it.
pub fn to_storage_precision(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(6)
}

/// Parses a `created_at` value: a timestamp string or epoch milliseconds.
pub fn parse_created_at(value: &Value) -> Result<DateTime<Utc>, AppError> {
    match value {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
            .ok_or_else(|| {
                AppError::BadRequest(format!("Invalid epoch milliseconds for created_at: {}", n))
            }),
        other => Err(AppError::BadRequest(format!(
            "Field 'created_at' must be a timestamp string or epoch milliseconds, got {}",
            other
        ))),
    }
}

/// Parse timestamp string to DateTime<Utc>
pub fn parse_timestamp(timestamp_str: &str) -> Result<DateTime<Utc>, AppError> {
    // Try ISO 8601 / RFC3339 format first (standard)
    DateTime::parse_from_rfc3339(timestamp_str)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Fallback: try custom format with timezone
            DateTime::parse_from_str(timestamp_str, "%Y-%m-%d %H:%M:%S%.f %z")
                .map(|dt| dt.with_timezone(&Utc))
        })
        .or_else(|_| {
            // Fallback: try naive datetime and assume UTC
            chrono::NaiveDateTime::parse_from_str(timestamp_str, "%Y-%m-%d %H:%M:%S%.f")
                .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
        })
        .map_err(|e| {
            AppError::BadRequest(format!(
                "Invalid timestamp format '{}': {}. Expected ISO 8601 (RFC3339)",
                timestamp_str, e
            ))
        })
}

// ============ Stored record ============

/// A lead as held by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StoredLead {
    /// Store-assigned primary key.
    pub id: i64,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    #[schema(value_type = Object)]
    pub attributes: Map<String, Value>,
}

impl StoredLead {
    /// Applies an overwriting submission: present identity fields, `created_at`,
    /// and every submitted attribute key replace the stored values. The id is kept.
    pub fn apply(&mut self, submission: &LeadSubmission) {
        if let Some(phone) = &submission.phone_number {
            self.phone_number = Some(phone.clone());
        }
        if let Some(email) = &submission.email {
            self.email = Some(email.clone());
        }
        self.created_at = submission.created_at;
        for (key, value) in &submission.attributes {
            self.attributes.insert(key.clone(), value.clone());
        }
    }
}

// ============ Outcome ============

/// Result of reconciling one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum ReconcileOutcome {
    /// A new record was created.
    Inserted { id: i64 },
    /// An existing record was overwritten in place.
    Updated { id: i64 },
    /// The submission was discarded without touching the store.
    Ignored { reason: String },
}

impl ReconcileOutcome {
    pub fn ignored() -> Self {
        ReconcileOutcome::Ignored {
            reason: OLDER_DUPLICATE.to_string(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::Inserted { .. } => "inserted",
            ReconcileOutcome::Updated { .. } => "updated",
            ReconcileOutcome::Ignored { .. } => "ignored",
        }
    }
}

// ============ Batch intake ============

/// Intake body - can be a single lead object or an array of them.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum LeadIntakePayload {
    Single(LeadPayload),
    Batch(Vec<LeadPayload>),
}

impl LeadIntakePayload {
    /// Convert to a vec of payloads for uniform processing
    pub fn into_payloads(self) -> Vec<LeadPayload> {
        match self {
            LeadIntakePayload::Single(payload) => vec![payload],
            LeadIntakePayload::Batch(payloads) => payloads,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            LeadIntakePayload::Single(_) => 1,
            LeadIntakePayload::Batch(payloads) => payloads.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-item result in a batch response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BatchItemResult {
    /// `inserted`, `updated`, `ignored` or `failed`.
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&ReconcileOutcome> for BatchItemResult {
    fn from(outcome: &ReconcileOutcome) -> Self {
        let (id, reason) = match outcome {
            ReconcileOutcome::Inserted { id } | ReconcileOutcome::Updated { id } => {
                (Some(*id), None)
            }
            ReconcileOutcome::Ignored { reason } => (None, Some(reason.clone())),
        };
        Self {
            outcome: outcome.label().to_string(),
            id,
            reason,
            error: None,
        }
    }
}

/// Response for batch intake.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct BatchIntakeResponse {
    pub received: usize,
    pub inserted: usize,
    pub updated: usize,
    pub ignored: usize,
    pub failed: usize,
    pub results: Vec<BatchItemResult>,
}

impl BatchIntakeResponse {
    pub fn record(&mut self, result: Result<ReconcileOutcome, AppError>) {
        match result {
            Ok(outcome) => {
                match outcome {
                    ReconcileOutcome::Inserted { .. } => self.inserted += 1,
                    ReconcileOutcome::Updated { .. } => self.updated += 1,
                    ReconcileOutcome::Ignored { .. } => self.ignored += 1,
                }
                self.results.push(BatchItemResult::from(&outcome));
            }
            Err(e) => {
                self.failed += 1;
                self.results.push(BatchItemResult {
                    outcome: "failed".to_string(),
                    id: None,
                    reason: None,
                    error: Some(e.to_string()),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> LeadPayload {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_submission_splits_typed_keys_from_attributes() {
        let submission = LeadSubmission::from_payload(
            payload(json!({
                "phone_number": "9876543210",
                "email": "a@x.com",
                "created_at": "2025-03-01T10:00:00Z",
                "name": "Ravi",
                "pincode": "560001",
                "product_interest": "Agri Sprayer X4"
            })),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(submission.phone_number.as_deref(), Some("9876543210"));
        assert_eq!(submission.email.as_deref(), Some("a@x.com"));
        assert_eq!(submission.created_at, t0());
        assert_eq!(submission.attributes.len(), 3);
        assert_eq!(submission.attributes["pincode"], json!("560001"));
        assert!(!submission.attributes.contains_key("phone_number"));
    }

    #[test]
    fn test_missing_created_at_defaults_to_receipt_time() {
        let received = t0();
        let submission =
            LeadSubmission::from_payload(payload(json!({"email": "a@x.com"})), received).unwrap();
        assert_eq!(submission.created_at, received);
    }

    #[test]
    fn test_submitted_id_is_not_an_attribute() {
        let submission = LeadSubmission::from_payload(
            payload(json!({"id": 42, "phone_number": "9876543210"})),
            t0(),
        )
        .unwrap();
        assert!(submission.attributes.is_empty());
    }

    #[test]
    fn test_blank_identity_rejected() {
        let err = LeadSubmission::from_payload(
            payload(json!({"phone_number": "  ", "email": "", "name": "Nobody"})),
            t0(),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_non_string_email_rejected() {
        let err =
            LeadSubmission::from_payload(payload(json!({"email": ["a@x.com"]})), t0()).unwrap_err();
        assert!(err.to_string().contains("email"));
    }

    #[test]
    fn test_numeric_phone_accepted() {
        let submission =
            LeadSubmission::from_payload(payload(json!({"phone_number": 9876543210u64})), t0())
                .unwrap();
        assert_eq!(submission.phone_number.as_deref(), Some("9876543210"));
    }

    #[test]
    fn test_created_at_formats() {
        assert_eq!(parse_created_at(&json!("2025-03-01T15:30:00+05:30")).unwrap(), t0());
        assert_eq!(parse_created_at(&json!("2025-03-01 10:00:00.000 +0000")).unwrap(), t0());
        assert_eq!(parse_created_at(&json!("2025-03-01 10:00:00")).unwrap(), t0());
        assert_eq!(parse_created_at(&json!(t0().timestamp_millis())).unwrap(), t0());
        assert!(parse_created_at(&json!("yesterday")).is_err());
        assert!(parse_created_at(&json!(true)).is_err());
    }

    #[test]
    fn test_created_at_truncated_to_microseconds() {
        let submission = LeadSubmission::from_payload(
            payload(json!({
                "phone_number": "9876543210",
                "created_at": "2025-02-01T12:00:00.123456789Z"
            })),
            t0(),
        )
        .unwrap();
        let expected = parse_timestamp("2025-02-01T12:00:00.123456Z").unwrap();
        assert_eq!(submission.created_at, expected);

        let received = t0() + chrono::Duration::nanoseconds(1_500);
        let defaulted =
            LeadSubmission::from_payload(payload(json!({"email": "a@x.com"})), received).unwrap();
        assert_eq!(defaulted.created_at, t0() + chrono::Duration::microseconds(1));
    }

    #[test]
    fn test_resubmission_compares_equal_after_storage_round_trip() {
        let raw = json!({"phone_number": "9876543210", "created_at": "2025-02-01T12:00:00.999999999Z"});
        let first = LeadSubmission::from_payload(payload(raw.clone()), t0()).unwrap();
        let again = LeadSubmission::from_payload(payload(raw), t0()).unwrap();

        // What a TIMESTAMPTZ column hands back for the first write.
        let stored_at = to_storage_precision(first.created_at);
        assert_eq!(stored_at, first.created_at);
        assert!(again.created_at <= stored_at);
    }

    #[test]
    fn test_identity_matching_ignores_absent_fields() {
        let identity = LeadIdentity::new(Some("9876543210"), None);
        assert!(identity.matches(Some("9876543210"), Some("other@x.com")));
        assert!(!identity.matches(None, None));
        assert!(!LeadIdentity::new(Some(""), Some(" ")).matches(None, None));
    }

    #[test]
    fn test_apply_overwrites_submitted_fields_only() {
        let mut stored = StoredLead {
            id: 1,
            phone_number: Some("9876543210".to_string()),
            email: Some("old@x.com".to_string()),
            created_at: t0(),
            attributes: payload(json!({"stage": "new", "city": "Pune"})),
        };
        let later = t0() + chrono::Duration::hours(1);
        let submission = LeadSubmission {
            phone_number: Some("9876543210".to_string()),
            email: None,
            created_at: later,
            attributes: payload(json!({"stage": "contacted"})),
        };

        stored.apply(&submission);

        assert_eq!(stored.id, 1);
        assert_eq!(stored.email.as_deref(), Some("old@x.com"));
        assert_eq!(stored.created_at, later);
        assert_eq!(stored.attributes["stage"], json!("contacted"));
        assert_eq!(stored.attributes["city"], json!("Pune"));
    }

    #[test]
    fn test_outcome_wire_format() {
        assert_eq!(
            serde_json::to_value(ReconcileOutcome::Inserted { id: 5 }).unwrap(),
            json!({"outcome": "inserted", "id": 5})
        );
        assert_eq!(
            serde_json::to_value(ReconcileOutcome::ignored()).unwrap(),
            json!({"outcome": "ignored", "reason": "older duplicate"})
        );
    }

    #[test]
    fn test_parse_single_and_batch_payloads() {
        let single: LeadIntakePayload =
            serde_json::from_value(json!({"phone_number": "1"})).unwrap();
        assert_eq!(single.len(), 1);

        let batch: LeadIntakePayload =
            serde_json::from_value(json!([{"email": "a@x.com"}, {"email": "b@x.com"}])).unwrap();
        assert_eq!(batch.into_payloads().len(), 2);
    }
}
