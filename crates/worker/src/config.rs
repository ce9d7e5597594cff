use std::path::PathBuf;

use koma_core::error::CoreError;
use koma_core::thresholds::DEFAULT_WINDOW_LENGTH;

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// JSON manifest listing the panels to validate.
    pub manifest: PathBuf,
    /// Directory reports are written to (default: `reports`).
    pub report_dir: PathBuf,
    /// Panels per coherence window (default: `3`).
    pub window_length: usize,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var              | Default    |
    /// |----------------------|------------|
    /// | `KOMA_MANIFEST`      | required   |
    /// | `KOMA_REPORT_DIR`    | `reports`  |
    /// | `KOMA_WINDOW_LENGTH` | `3`        |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let manifest = get("KOMA_MANIFEST")
            .map(PathBuf::from)
            .ok_or_else(|| CoreError::Configuration("KOMA_MANIFEST must be set".into()))?;

        let report_dir = get("KOMA_REPORT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("reports"));

        let window_length = match get("KOMA_WINDOW_LENGTH") {
            None => DEFAULT_WINDOW_LENGTH,
            Some(raw) => raw.parse().map_err(|_| {
                CoreError::Configuration(format!("KOMA_WINDOW_LENGTH has an invalid value: {raw}"))
            })?,
        };

        Ok(Self {
            manifest,
            report_dir,
            window_length,
        })
    }
}
