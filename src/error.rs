use thiserror::Error;

/// Failure modes of the report and photo stores. Unparsable stored JSON is
/// not represented here: the report store silently falls back to the empty
/// default document instead of surfacing it.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
