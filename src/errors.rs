use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Application-specific error types.
#[derive(Debug)]
pub enum AppError {
    /// Database-related errors.
    DatabaseError(sqlx::Error),
    /// Resource not found error.
    NotFound(String),
    /// Bad request error (invalid input).
    BadRequest(String),
    /// Internal server error.
    InternalError(String),
    /// Unauthorized access error.
    Unauthorized(String),
    /// The identity query could not complete. No write was attempted.
    LookupFailure(Box<AppError>),
    /// Writing a new lead record failed.
    InsertFailure(Box<AppError>),
    /// Overwriting an existing lead record failed.
    UpdateFailure(Box<AppError>),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

/// Which reconciliation step produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Lookup,
    Insert,
    Update,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Lookup => "lookup",
            Phase::Insert => "insert",
            Phase::Update => "update",
        }
    }
}

impl AppError {
    /// Returns the reconciliation phase for phase errors, looking through context wrappers.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            AppError::LookupFailure(_) => Some(Phase::Lookup),
            AppError::InsertFailure(_) => Some(Phase::Insert),
            AppError::UpdateFailure(_) => Some(Phase::Update),
            AppError::WithContext { source, .. } => source.phase(),
            _ => None,
        }
    }
}

impl fmt::Display for AppError {
    /// Formats the error for display.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::DatabaseError(e) => write!(f, "Database error: {}", e),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::LookupFailure(source) => write!(f, "Lead lookup failed: {}", source),
            AppError::InsertFailure(source) => write!(f, "Lead insert failed: {}", source),
            AppError::UpdateFailure(source) => write!(f, "Lead update failed: {}", source),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    /// Converts the error into an HTTP response.
    ///
    /// Maps each error variant to an appropriate HTTP status code and JSON body.
    /// Store failures during reconciliation carry the phase that produced them.
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::DatabaseError(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Unauthorized(msg) => {
                tracing::warn!("Unauthorized access: {}", msg);
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
            }
            AppError::LookupFailure(_)
            | AppError::InsertFailure(_)
            | AppError::UpdateFailure(_) => {
                tracing::error!("{}", self);
                let phase = self.phase().map(|p| p.as_str()).unwrap_or("unknown");
                let body = Json(json!({
                    "error": format!("Lead {} failed, please resubmit", phase),
                    "phase": phase,
                }));
                return (StatusCode::SERVICE_UNAVAILABLE, body).into_response();
            }
            AppError::WithContext { source, context } => {
                // Log full context chain for debugging
                tracing::error!("Error with context: {} -> {}", context, source);
                // Delegate to underlying error's response
                return source.clone().into_response();
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

// Make AppError cloneable for WithContext variant
impl Clone for AppError {
    /// Clones the error.
    ///
    /// Note: `sqlx::Error` is not cloneable, so `DatabaseError` keeps only its message.
    fn clone(&self) -> Self {
        match self {
            AppError::DatabaseError(e) => {
                AppError::DatabaseError(sqlx::Error::Protocol(e.to_string()))
            }
            AppError::NotFound(msg) => AppError::NotFound(msg.clone()),
            AppError::BadRequest(msg) => AppError::BadRequest(msg.clone()),
            AppError::InternalError(msg) => AppError::InternalError(msg.clone()),
            AppError::Unauthorized(msg) => AppError::Unauthorized(msg.clone()),
            AppError::LookupFailure(source) => AppError::LookupFailure(source.clone()),
            AppError::InsertFailure(source) => AppError::InsertFailure(source.clone()),
            AppError::UpdateFailure(source) => AppError::UpdateFailure(source.clone()),
            AppError::WithContext { source, context } => AppError::WithContext {
                source: source.clone(),
                context: context.clone(),
            },
        }
    }
}

impl From<sqlx::Error> for AppError {
    /// Converts a `sqlx::Error` into an `AppError`.
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("Invalid JSON: {}", err))
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    ///
    /// # Arguments
    ///
    /// * `context` - The context message to add.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Add context lazily (only evaluated on error).
    ///
    /// # Arguments
    ///
    /// * `f` - A closure that produces the context message.
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}

/// Extension for sqlx::Error to add context
impl<T> ResultExt<T> for Result<T, sqlx::Error> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(AppError::DatabaseError(e)),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(AppError::DatabaseError(e)),
            context: f(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_errors_identify_their_phase() {
        let source = || Box::new(AppError::InternalError("connection reset".to_string()));

        assert_eq!(AppError::LookupFailure(source()).phase(), Some(Phase::Lookup));
        assert_eq!(AppError::InsertFailure(source()).phase(), Some(Phase::Insert));
        assert_eq!(AppError::UpdateFailure(source()).phase(), Some(Phase::Update));
        assert_eq!(AppError::BadRequest("x".to_string()).phase(), None);
    }

    #[test]
    fn test_phase_survives_context_wrapping() {
        let err: Result<(), AppError> = Err(AppError::UpdateFailure(Box::new(
            AppError::InternalError("disk full".to_string()),
        )));
        let wrapped = err.context("batch item 3").unwrap_err();

        assert_eq!(wrapped.phase(), Some(Phase::Update));
        assert!(wrapped.to_string().starts_with("batch item 3: Lead update failed"));
    }

    #[test]
    fn test_phase_error_display_includes_source() {
        let err = AppError::LookupFailure(Box::new(AppError::DatabaseError(
            sqlx::Error::PoolTimedOut,
        )));
        let msg = err.to_string();
        assert!(msg.starts_with("Lead lookup failed"));
        assert!(msg.contains("Database error"));
    }

    #[test]
    fn test_phase_error_maps_to_service_unavailable() {
        let err = AppError::InsertFailure(Box::new(AppError::InternalError("boom".to_string())));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_context_delegates_status() {
        let err: Result<(), sqlx::Error> = Err(sqlx::Error::RowNotFound);
        let wrapped = err.context("Failed to load lead").unwrap_err();
        assert!(wrapped.to_string().starts_with("Failed to load lead: Database error"));

        let response = AppError::WithContext {
            source: Box::new(AppError::NotFound("lead 7".to_string())),
            context: "lookup".to_string(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
