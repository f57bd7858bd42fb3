//! Process-wide configuration.
//!
//! Values come from an optional JSON file, then environment overrides, then
//! whatever the binary sets from its command line.

use crate::application::recommendation_loop::MAX_ROUNDS;
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Text the generation backend is primed with on every round.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a payment optimization assistant that helps reduce cross-border payment fees.
Find the most cost-effective way to send the payment while keeping settlement fast.
Each payment method analysis in the conversation comes from a deterministic fee comparison; rely on its numbers.
Consider amount, fees and settlement time, then conclude with:
FINAL RECOMMENDATION:
- Method: [CRYPTO_ADDRESS/US_ACH]
- Reason: [brief explanation]
- Estimated Fees: [amount]
- Settlement Time: [duration]
- Savings: [amount saved compared to the alternative method]";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub payman: PaymanConfig,
    pub llm: LlmConfig,
    pub fees: FeeSchedule,
    pub recommendation: RecommendationConfig,
    pub resilience: ResilienceConfig,
    pub notification: NotificationConfig,
}

/// Payments gateway connection.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymanConfig {
    pub api_url: String,
    pub api_secret: String,
    pub timeout_secs: u64,
}

impl Default for PaymanConfig {
    fn default() -> Self {
        Self {
            api_url: "https://agent.payman.ai/api".to_string(),
            api_secret: String::new(),
            timeout_secs: 30,
        }
    }
}

impl PaymanConfig {
    pub fn new(api_url: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_secret: api_secret.into(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// OpenAI-compatible chat completion endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.groq.com/openai/v1".to_string(),
            api_key: String::new(),
            model: "mixtral-8x7b-32768".to_string(),
            temperature: 0.0,
            timeout_secs: 30,
        }
    }
}

impl LlmConfig {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// Fee rates per rail, as fractions of the amount.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeSchedule {
    pub bank_transfer_rate: Decimal,
    pub stablecoin_rate: Decimal,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            bank_transfer_rate: dec!(0.03),
            stablecoin_rate: dec!(0.001),
        }
    }
}

impl FeeSchedule {
    pub fn validate(&self) -> Result<()> {
        for (name, rate) in [
            ("bank_transfer_rate", self.bank_transfer_rate),
            ("stablecoin_rate", self.stablecoin_rate),
        ] {
            if rate < Decimal::ZERO || rate >= Decimal::ONE {
                return Err(PaymentError::ValidationError(format!(
                    "{name} must be in [0, 1), got {rate}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationConfig {
    /// Lowers the round ceiling; never above `MAX_ROUNDS`.
    pub max_rounds: u8,
    pub system_prompt: String,
    /// Calls per round including the first, so 2 means one retry.
    pub generation_attempts: u8,
    pub generation_timeout_ms: u64,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            max_rounds: MAX_ROUNDS,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            generation_attempts: 2,
            generation_timeout_ms: 30_000,
        }
    }
}

impl RecommendationConfig {
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.generation_timeout_ms)
    }

    pub fn with_max_rounds(mut self, rounds: u8) -> Self {
        self.max_rounds = rounds;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }
}

/// Retry and circuit-breaking around the payments gateway.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            failure_threshold: 5,
            cooldown_secs: 30,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Notices are only logged when unset.
    pub webhook_url: Option<String>,
    pub sender: String,
    /// How long the binary waits for in-flight notices before exiting.
    pub drain_timeout_secs: u64,
}

impl NotificationConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            sender: "payments@coinnect.local".to_string(),
            drain_timeout_secs: 10,
        }
    }
}

impl AppConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let config: Self = serde_json::from_reader(file)?;
        Ok(config)
    }

    /// Applies overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`, keyed by environment variable name.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secret) = lookup("PAYMAN_API_KEY") {
            self.payman.api_secret = secret;
        }
        if let Some(url) = lookup("PAYMAN_API_URL") {
            self.payman.api_url = url;
        }
        if let Some(key) = lookup("GROQ_API_KEY") {
            self.llm.api_key = key;
        }
        if let Some(url) = lookup("GROQ_API_URL") {
            self.llm.api_url = url;
        }
        if let Some(model) = lookup("GROQ_MODEL") {
            self.llm.model = model;
        }
        if let Some(rate) = lookup("COINNECT_BANK_FEE_RATE") {
            self.fees.bank_transfer_rate = rate.trim().parse().map_err(|_| {
                PaymentError::ValidationError(format!("Invalid COINNECT_BANK_FEE_RATE: {rate}"))
            })?;
        }
        if let Some(url) = lookup("COINNECT_NOTIFY_WEBHOOK") {
            self.notification.webhook_url = Some(url);
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        self.fees.validate()?;
        if !(1..=MAX_ROUNDS).contains(&self.recommendation.max_rounds) {
            return Err(PaymentError::ValidationError(format!(
                "max_rounds must be between 1 and {MAX_ROUNDS}, got {}",
                self.recommendation.max_rounds
            )));
        }
        if self.recommendation.generation_timeout_ms == 0 {
            return Err(PaymentError::ValidationError(
                "generation_timeout_ms must be positive".to_string(),
            ));
        }
        if self.recommendation.generation_attempts == 0 {
            return Err(PaymentError::ValidationError(
                "generation_attempts must be at least 1".to_string(),
            ));
        }
        if self.resilience.max_attempts == 0 {
            return Err(PaymentError::ValidationError(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
