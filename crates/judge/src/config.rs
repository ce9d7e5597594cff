//! Judge gateway configuration loaded from environment variables.

use std::sync::Arc;
use std::time::Duration;

use koma_core::error::CoreError;

use crate::api::{http_client, HostedBackend, OllamaBackend};
use crate::backend::{BackendKind, JudgeBackend};
use crate::gateway::JudgeGateway;
use crate::retry::RetryPolicy;
use crate::rotation::JudgeRotation;

/// Default hosted model when `KOMA_HOSTED_MODEL` is not set.
const DEFAULT_HOSTED_MODEL: &str = "gemini-1.5-flash";

/// Endpoints, credentials, and retry tuning for the judge chain.
///
/// Strategies whose endpoint or model is unset are left out of the chain;
/// with nothing configured the gateway runs offline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeConfig {
    /// Local Ollama-compatible base URL.
    pub local_url: Option<String>,
    pub local_primary_model: Option<String>,
    /// Whether the primary local model accepts images (default: `true`).
    pub local_primary_vision: bool,
    pub local_secondary_model: Option<String>,
    /// Whether the secondary local model accepts images (default: `false`).
    pub local_secondary_vision: bool,
    /// Hosted judge base URL.
    pub hosted_url: Option<String>,
    pub hosted_model: String,
    /// Hosted credential pool, rotated on HTTP 429.
    pub hosted_api_keys: Vec<String>,
    pub retry: RetryPolicy,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            local_url: None,
            local_primary_model: None,
            local_primary_vision: true,
            local_secondary_model: None,
            local_secondary_vision: false,
            hosted_url: None,
            hosted_model: DEFAULT_HOSTED_MODEL.to_string(),
            hosted_api_keys: Vec::new(),
            retry: RetryPolicy::default(),
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, CoreError> {
    match lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| CoreError::Configuration(format!("{key} has an invalid value: {raw}"))),
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl JudgeConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default            |
    /// |-------------------------------|--------------------|
    /// | `KOMA_LOCAL_JUDGE_URL`        | unset              |
    /// | `KOMA_LOCAL_PRIMARY_MODEL`    | unset              |
    /// | `KOMA_LOCAL_PRIMARY_VISION`   | `true`             |
    /// | `KOMA_LOCAL_SECONDARY_MODEL`  | unset              |
    /// | `KOMA_LOCAL_SECONDARY_VISION` | `false`            |
    /// | `KOMA_HOSTED_JUDGE_URL`       | unset              |
    /// | `KOMA_HOSTED_MODEL`           | `gemini-1.5-flash` |
    /// | `KOMA_HOSTED_API_KEYS`        | empty (comma list) |
    /// | `KOMA_JUDGE_TIMEOUT_SECS`     | `60`               |
    /// | `KOMA_JUDGE_MAX_ATTEMPTS`     | `3`                |
    /// | `KOMA_JUDGE_BACKOFF_BASE_MS`  | `1000`             |
    /// | `KOMA_JUDGE_BACKOFF_MAX_MS`   | `30000`            |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reading from `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let defaults = Self::default();

        let max_attempts: u32 = parse_or(&lookup, "KOMA_JUDGE_MAX_ATTEMPTS", 3)?;
        if max_attempts == 0 {
            return Err(CoreError::Configuration(
                "KOMA_JUDGE_MAX_ATTEMPTS must be at least 1".into(),
            ));
        }
        let retry = RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(parse_or(&lookup, "KOMA_JUDGE_BACKOFF_BASE_MS", 1000)?),
            max_delay: Duration::from_millis(parse_or(&lookup, "KOMA_JUDGE_BACKOFF_MAX_MS", 30_000)?),
            call_timeout: Duration::from_secs(parse_or(&lookup, "KOMA_JUDGE_TIMEOUT_SECS", 60)?),
        };

        let hosted_api_keys = non_empty(&lookup, "KOMA_HOSTED_API_KEYS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            local_url: non_empty(&lookup, "KOMA_LOCAL_JUDGE_URL"),
            local_primary_model: non_empty(&lookup, "KOMA_LOCAL_PRIMARY_MODEL"),
            local_primary_vision: parse_or(
                &lookup,
                "KOMA_LOCAL_PRIMARY_VISION",
                defaults.local_primary_vision,
            )?,
            local_secondary_model: non_empty(&lookup, "KOMA_LOCAL_SECONDARY_MODEL"),
            local_secondary_vision: parse_or(
                &lookup,
                "KOMA_LOCAL_SECONDARY_VISION",
                defaults.local_secondary_vision,
            )?,
            hosted_url: non_empty(&lookup, "KOMA_HOSTED_JUDGE_URL"),
            hosted_model: non_empty(&lookup, "KOMA_HOSTED_MODEL").unwrap_or(defaults.hosted_model),
            hosted_api_keys,
            retry,
        })
    }

    /// Build the strategy chain in cost order.
    pub fn build_gateway(&self, rotation: Arc<JudgeRotation>) -> Result<JudgeGateway, CoreError> {
        let client = http_client(self.retry.call_timeout)
            .map_err(|e| CoreError::Configuration(format!("judge HTTP client: {e}")))?;

        let mut strategies: Vec<Arc<dyn JudgeBackend>> = Vec::new();
        if let Some(url) = &self.local_url {
            let locals = [
                (&self.local_primary_model, BackendKind::LocalPreferred, self.local_primary_vision),
                (&self.local_secondary_model, BackendKind::LocalSecondary, self.local_secondary_vision),
            ];
            for (model, kind, vision) in locals {
                if let Some(model) = model {
                    strategies.push(Arc::new(OllamaBackend::new(
                        client.clone(),
                        url.clone(),
                        model.clone(),
                        kind,
                        vision,
                    )));
                }
            }
        }
        if let Some(url) = &self.hosted_url {
            if self.hosted_api_keys.is_empty() {
                tracing::warn!("KOMA_HOSTED_JUDGE_URL is set but KOMA_HOSTED_API_KEYS is empty");
            }
            strategies.push(Arc::new(HostedBackend::new(
                client.clone(),
                url.clone(),
                self.hosted_model.clone(),
            )));
        }

        let gateway = JudgeGateway::new(
            strategies,
            self.hosted_api_keys.clone(),
            rotation,
            self.retry.clone(),
        );
        tracing::info!(strategies = ?gateway.strategy_names(), "Judge gateway configured");
        Ok(gateway)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;
    use crate::backend::Capability;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = JudgeConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, JudgeConfig::default());
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.call_timeout, Duration::from_secs(60));
    }

    #[test]
    fn parses_key_pool_and_tuning() {
        let config = JudgeConfig::from_lookup(lookup(&[
            ("KOMA_HOSTED_API_KEYS", " k1, k2 ,,k3 "),
            ("KOMA_JUDGE_MAX_ATTEMPTS", "5"),
            ("KOMA_JUDGE_BACKOFF_BASE_MS", "250"),
            ("KOMA_LOCAL_SECONDARY_VISION", "true"),
        ]))
        .unwrap();
        assert_eq!(config.hosted_api_keys, vec!["k1", "k2", "k3"]);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay, Duration::from_millis(250));
        assert!(config.local_secondary_vision);
    }

    #[test]
    fn invalid_number_is_configuration_error() {
        let err = JudgeConfig::from_lookup(lookup(&[("KOMA_JUDGE_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert_matches!(err, CoreError::Configuration(msg) if msg.contains("KOMA_JUDGE_TIMEOUT_SECS"));
    }

    #[test]
    fn zero_attempts_rejected() {
        assert!(JudgeConfig::from_lookup(lookup(&[("KOMA_JUDGE_MAX_ATTEMPTS", "0")])).is_err());
    }

    #[test]
    fn chain_follows_configured_endpoints() {
        let config = JudgeConfig::from_lookup(lookup(&[
            ("KOMA_LOCAL_JUDGE_URL", "http://localhost:11434"),
            ("KOMA_LOCAL_PRIMARY_MODEL", "llava"),
            ("KOMA_LOCAL_SECONDARY_MODEL", "llama3"),
            ("KOMA_HOSTED_JUDGE_URL", "https://example.test"),
            ("KOMA_HOSTED_API_KEYS", "k1"),
        ]))
        .unwrap();
        let gateway = config.build_gateway(Arc::new(JudgeRotation::new())).unwrap();
        assert_eq!(
            gateway.strategy_names(),
            vec!["ollama:llava", "ollama:llama3", "hosted:gemini-1.5-flash"]
        );
        assert!(gateway.is_configured(Capability::Multimodal));
    }

    #[test]
    fn model_without_url_is_ignored() {
        let config =
            JudgeConfig::from_lookup(lookup(&[("KOMA_LOCAL_PRIMARY_MODEL", "llava")])).unwrap();
        let gateway = config.build_gateway(Arc::new(JudgeRotation::new())).unwrap();
        assert!(gateway.strategy_names().is_empty());
        assert!(!gateway.is_configured(Capability::Text));
    }
}
