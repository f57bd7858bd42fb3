use super::fee_estimator::FeeEstimator;
use crate::config::RecommendationConfig;
use crate::domain::amount::Amount;
use crate::domain::payee::{SettlementKind, SettlementMethod};
use crate::domain::ports::{NotifierHandle, TextGenerationBox};
use crate::domain::recommendation::{
    FeeEstimate, Narrative, Recommendation, SettlementTime, Termination, Turn,
};
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Case-insensitive phrase that ends the loop when it appears in commentary.
pub const TERMINAL_MARKER: &str = "final recommendation:";

/// Hard ceiling on rounds; configuration may only lower it.
pub const MAX_ROUNDS: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Active,
    Terminated(Termination),
}

/// Next state after a round produced `commentary`.
///
/// The marker takes precedence over the round ceiling.
pub fn transition(commentary: &str, rounds_taken: u8, max_rounds: u8) -> LoopState {
    if commentary.to_lowercase().contains(TERMINAL_MARKER) {
        LoopState::Terminated(Termination::Marker)
    } else if rounds_taken >= max_rounds {
        LoopState::Terminated(Termination::SoftTimeout)
    } else {
        LoopState::Active
    }
}

#[derive(Debug, Clone)]
pub struct RecommendationRequest {
    pub amount: Amount,
    pub methods: Vec<SettlementMethod>,
    pub narrative_seed: String,
    /// Where to send a cheaper-rail notice, if one is warranted.
    pub recipient_email: Option<String>,
}

/// Per-request loop state, discarded once a recommendation is produced.
#[derive(Debug, Clone)]
pub struct RecommendationState {
    pub narrative: Narrative,
    pub amount: Amount,
    pub methods: Vec<SettlementMethod>,
    pub rounds_taken: u8,
    pub last_estimate: Option<FeeEstimate>,
}

impl RecommendationState {
    fn new(request: &RecommendationRequest) -> Self {
        Self {
            narrative: Narrative::seeded(request.narrative_seed.clone()),
            amount: request.amount,
            methods: request.methods.clone(),
            rounds_taken: 0,
            last_estimate: None,
        }
    }

    fn finish(self, termination: Termination) -> Recommendation {
        let commentary = match termination {
            Termination::Degraded => None,
            _ => self.narrative.last_commentary().map(str::to_string),
        };
        let (method, fee, settlement_time, reason) = match self.last_estimate {
            Some(estimate) => (
                estimate.method,
                estimate.fee,
                estimate.settlement_time,
                estimate.reason,
            ),
            None => (
                None,
                Decimal::ZERO,
                SettlementTime::Unknown,
                "No valid payment methods found".to_string(),
            ),
        };

        Recommendation {
            method,
            fee,
            settlement_time,
            rationale: commentary.clone().unwrap_or(reason),
            commentary,
            rounds_taken: self.rounds_taken,
            termination,
            notification_requested: false,
        }
    }
}

/// Bounded advisory loop alternating fee estimation and text generation.
pub struct RecommendationLoop {
    estimator: FeeEstimator,
    backend: TextGenerationBox,
    notifier: Option<NotifierHandle>,
    /// Notices still in flight, kept so they can be awaited before shutdown.
    notices: Mutex<JoinSet<()>>,
    config: RecommendationConfig,
}

impl RecommendationLoop {
    pub fn new(
        estimator: FeeEstimator,
        backend: TextGenerationBox,
        config: RecommendationConfig,
    ) -> Self {
        Self {
            estimator,
            backend,
            notifier: None,
            notices: Mutex::new(JoinSet::new()),
            config,
        }
    }

    pub fn with_notifier(mut self, notifier: NotifierHandle) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn estimator(&self) -> &FeeEstimator {
        &self.estimator
    }

    /// Runs the loop to termination.
    ///
    /// Backend failures degrade to the deterministic estimate. Only when no
    /// estimate exists (no methods) is `RecommendationUnavailable` returned.
    pub async fn recommend(&self, request: RecommendationRequest) -> Result<Recommendation> {
        let mut state = RecommendationState::new(&request);

        let termination = loop {
            match self.step(&mut state).await {
                Ok(LoopState::Active) => continue,
                Ok(LoopState::Terminated(termination)) => break termination,
                Err(err) if state.last_estimate.is_some() => {
                    warn!(
                        round = state.rounds_taken,
                        error = %err,
                        "Text generation failed, using deterministic estimate"
                    );
                    break Termination::Degraded;
                }
                Err(err) => {
                    return Err(PaymentError::RecommendationUnavailable(err.to_string()));
                }
            }
        };

        let mut recommendation = state.finish(termination);
        info!(
            method = ?recommendation.kind(),
            fee = %recommendation.fee,
            rounds = recommendation.rounds_taken,
            termination = ?recommendation.termination,
            "Recommendation ready"
        );

        if recommendation.kind() == Some(SettlementKind::BankTransfer)
            && let Some(email) = request.recipient_email
        {
            recommendation.notification_requested = self.dispatch_notice(email, request.amount);
        }

        Ok(recommendation)
    }

    async fn step(&self, state: &mut RecommendationState) -> Result<LoopState> {
        state.rounds_taken += 1;

        if !state.methods.is_empty() {
            let estimate = self.estimator.estimate(&state.methods, state.amount);
            state.narrative.push(Turn::Analysis(estimate.describe()));
            state.last_estimate = Some(estimate);
        }

        let commentary = self.generate(&state.narrative).await?;
        let next = transition(&commentary, state.rounds_taken, self.max_rounds());
        debug!(round = state.rounds_taken, ?next, "Round complete");
        state.narrative.push(Turn::Commentary(commentary));

        Ok(next)
    }

    fn max_rounds(&self) -> u8 {
        self.config.max_rounds.clamp(1, MAX_ROUNDS)
    }

    /// One backend call per attempt, each bounded by the generation timeout.
    async fn generate(&self, narrative: &Narrative) -> Result<String> {
        let timeout = self.config.generation_timeout();
        let attempts = self.config.generation_attempts.max(1);
        let mut last_error =
            PaymentError::TextGenerationError("no generation attempt made".to_string());

        for attempt in 1..=attempts {
            let call = self.backend.generate(&self.config.system_prompt, narrative);
            let result = match tokio::time::timeout(timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(PaymentError::TextGenerationTimeout(timeout)),
            };

            match result {
                Ok(text) if !text.trim().is_empty() => return Ok(text),
                Ok(_) => {
                    last_error =
                        PaymentError::TextGenerationError("empty commentary".to_string());
                }
                Err(err) => last_error = err,
            }
            debug!(attempt, error = %last_error, "Generation attempt failed");
        }

        Err(last_error)
    }

    /// Fire-and-forget relative to the caller; returns whether a notice was scheduled.
    fn dispatch_notice(&self, email: String, amount: Amount) -> bool {
        let Some(notifier) = self.notifier.clone() else {
            return false;
        };

        let mut notices = self.notices();
        while notices.try_join_next().is_some() {}
        notices.spawn(async move {
            if let Err(err) = notifier.notify_cheaper_method_available(&email, amount).await {
                warn!(%email, error = %err, "Failed to deliver fee comparison notice");
            }
        });
        true
    }

    /// Waits up to `limit` for scheduled notices; returns how many completed.
    ///
    /// Notices still pending when `limit` expires are aborted.
    pub async fn drain_notices(&self, limit: Duration) -> usize {
        let mut pending = std::mem::take(&mut *self.notices());
        let total = pending.len();
        let mut completed = 0;

        let drained = tokio::time::timeout(limit, async {
            while let Some(result) = pending.join_next().await {
                if let Err(err) = result {
                    warn!(error = %err, "Fee comparison notice task failed");
                }
                completed += 1;
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                pending = total - completed,
                ?limit,
                "Abandoning undelivered fee comparison notices"
            );
        }
        completed
    }

    fn notices(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.notices.lock().unwrap_or_else(|e| e.into_inner())
    }
}
