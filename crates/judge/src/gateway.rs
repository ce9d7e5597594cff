//! Chain-of-responsibility judge gateway.
//!
//! Strategies are tried in configured order (local preferred, local
//! secondary, hosted), starting from whichever strategy last produced a
//! usable judgment. Each strategy gets up to `max_attempts` calls with
//! exponential backoff between retryable failures; non-retryable failures
//! and undecodable responses fall through to the next strategy at once.
//! A 429 from a credentialed backend advances the shared credential cursor
//! before the retry.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backend::{Capability, JudgeBackend, JudgeRequest};
use crate::decode::{decode, DecodeStage, Decoded, JudgeVerdict};
use crate::error::BackendError;
use crate::retry::RetryPolicy;
use crate::rotation::JudgeRotation;

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// Why no judgment is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    /// No strategy for the requested capability is configured.
    NotConfigured,
    /// Strategies were tried and every attempt failed.
    Exhausted,
    /// The caller had nothing for a judge to assess.
    Skipped,
}

/// One failed backend call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptFailure {
    pub backend: String,
    /// One-based attempt number within that backend.
    pub attempt: u32,
    pub error: String,
}

/// Result of a gateway call. Never an error.
#[derive(Debug, Clone, PartialEq)]
pub enum JudgeOutcome<T> {
    Verdict {
        backend: String,
        stage: DecodeStage,
        value: T,
        /// Total calls made, including failed ones on earlier strategies.
        attempts: u32,
    },
    Unavailable {
        reason: UnavailableReason,
        failures: Vec<AttemptFailure>,
    },
}

/// Serializable summary of where a judgment came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeProvenance {
    pub backend: Option<String>,
    pub stage: Option<DecodeStage>,
    pub unavailable: Option<UnavailableReason>,
    pub attempts: u32,
}

impl<T> JudgeOutcome<T> {
    /// Outcome for a request that was never sent.
    pub fn skipped() -> Self {
        Self::Unavailable {
            reason: UnavailableReason::Skipped,
            failures: Vec::new(),
        }
    }

    pub fn verdict(&self) -> Option<&T> {
        match self {
            Self::Verdict { value, .. } => Some(value),
            Self::Unavailable { .. } => None,
        }
    }

    pub fn into_verdict(self) -> Option<T> {
        match self {
            Self::Verdict { value, .. } => Some(value),
            Self::Unavailable { .. } => None,
        }
    }

    /// Every configured strategy was tried and failed.
    pub fn is_exhausted(&self) -> bool {
        matches!(
            self,
            Self::Unavailable {
                reason: UnavailableReason::Exhausted,
                ..
            }
        )
    }

    pub fn provenance(&self) -> JudgeProvenance {
        match self {
            Self::Verdict {
                backend,
                stage,
                attempts,
                ..
            } => JudgeProvenance {
                backend: Some(backend.clone()),
                stage: Some(*stage),
                unavailable: None,
                attempts: *attempts,
            },
            Self::Unavailable { reason, failures } => JudgeProvenance {
                backend: None,
                stage: None,
                unavailable: Some(*reason),
                attempts: failures.len() as u32,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// JudgeGateway
// ---------------------------------------------------------------------------

/// Ordered judge strategies plus the shared rotation state.
pub struct JudgeGateway {
    strategies: Vec<Arc<dyn JudgeBackend>>,
    credentials: Vec<String>,
    rotation: Arc<JudgeRotation>,
    policy: RetryPolicy,
}

impl JudgeGateway {
    pub fn new(
        strategies: Vec<Arc<dyn JudgeBackend>>,
        credentials: Vec<String>,
        rotation: Arc<JudgeRotation>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            strategies,
            credentials,
            rotation,
            policy,
        }
    }

    /// A gateway with no strategies; every call is `NotConfigured`.
    pub fn offline() -> Self {
        Self::new(
            Vec::new(),
            Vec::new(),
            Arc::new(JudgeRotation::new()),
            RetryPolicy::default(),
        )
    }

    pub fn rotation(&self) -> &Arc<JudgeRotation> {
        &self.rotation
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn is_configured(&self, capability: Capability) -> bool {
        self.strategies.iter().any(|s| s.supports(capability))
    }

    /// Strategy indices for `capability`, preferred strategy first.
    fn order(&self, capability: Capability) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.strategies.len())
            .filter(|&i| self.strategies[i].supports(capability))
            .collect();
        let preferred = self.rotation.preferred();
        if let Some(pos) = order.iter().position(|&i| i == preferred) {
            order.remove(pos);
            order.insert(0, preferred);
        }
        order
    }

    /// Run the chain for `request` and decode the first usable response.
    pub async fn judge<T: JudgeVerdict>(&self, request: &JudgeRequest) -> JudgeOutcome<T> {
        let capability = request.capability();
        let order = self.order(capability);
        if order.is_empty() {
            tracing::debug!(?capability, "No judge strategy configured");
            return JudgeOutcome::Unavailable {
                reason: UnavailableReason::NotConfigured,
                failures: Vec::new(),
            };
        }

        let mut failures = Vec::new();
        for idx in order {
            if let Some(decoded) = self.try_strategy::<T>(idx, request, &mut failures).await {
                self.rotation.mark_success(idx);
                let backend = self.strategies[idx].name().to_string();
                tracing::debug!(
                    backend = %backend,
                    stage = ?decoded.stage,
                    failed_attempts = failures.len(),
                    "Judge responded",
                );
                return JudgeOutcome::Verdict {
                    backend,
                    stage: decoded.stage,
                    value: decoded.value,
                    attempts: failures.len() as u32 + 1,
                };
            }
        }

        self.rotation.reset_preferred();
        tracing::warn!(
            ?capability,
            attempts = failures.len(),
            "Judge chain exhausted, continuing without judgment",
        );
        JudgeOutcome::Unavailable {
            reason: UnavailableReason::Exhausted,
            failures,
        }
    }

    async fn try_strategy<T: JudgeVerdict>(
        &self,
        idx: usize,
        request: &JudgeRequest,
        failures: &mut Vec<AttemptFailure>,
    ) -> Option<Decoded<T>> {
        let backend = &self.strategies[idx];

        for attempt in 0..self.policy.max_attempts {
            let credential = if backend.requires_credential() {
                match self.rotation.credential_index(self.credentials.len()) {
                    Some(i) => Some(self.credentials[i].as_str()),
                    None => {
                        let error = BackendError::MissingCredential;
                        Self::record(failures, backend.name(), attempt, &error);
                        return None;
                    }
                }
            } else {
                None
            };

            let result = tokio::time::timeout(
                self.policy.call_timeout,
                backend.complete(request, credential),
            )
            .await
            .unwrap_or(Err(BackendError::Timeout));

            let error = match result {
                Ok(text) => match decode::<T>(&text) {
                    Some(decoded) => return Some(decoded),
                    None => BackendError::Decode("no JSON object or continuity keywords".into()),
                },
                Err(e) => e,
            };
            Self::record(failures, backend.name(), attempt, &error);

            if error == BackendError::RateLimited && backend.requires_credential() {
                if let Some(next) = self.rotation.rotate_credential(self.credentials.len()) {
                    tracing::info!(
                        backend = backend.name(),
                        credential_index = next,
                        "Rotated judge credential",
                    );
                }
            }

            if !error.is_retryable() || attempt + 1 >= self.policy.max_attempts {
                break;
            }
            let delay = self.policy.delay(attempt);
            tracing::debug!(
                backend = backend.name(),
                delay_ms = delay.as_millis() as u64,
                "Backing off before judge retry",
            );
            tokio::time::sleep(delay).await;
        }
        None
    }

    fn record(failures: &mut Vec<AttemptFailure>, backend: &str, attempt: u32, error: &BackendError) {
        tracing::warn!(
            backend,
            attempt = attempt + 1,
            error = %error,
            "Judge attempt failed",
        );
        failures.push(AttemptFailure {
            backend: backend.to_string(),
            attempt: attempt + 1,
            error: error.to_string(),
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
