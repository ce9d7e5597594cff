/// Errors that abort a validation run.
///
/// Unreadable images and unavailable judges are never reported through this
/// type; those degrade into low-confidence results instead.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Validation run cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}
