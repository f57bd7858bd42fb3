use super::payee::{SettlementKind, SettlementMethod};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Expected time until funds reach the payee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementTime {
    Instant,
    BusinessDays { min: u8, max: u8 },
    Unknown,
}

impl SettlementTime {
    pub fn for_kind(kind: SettlementKind) -> Self {
        match kind {
            SettlementKind::StableCoinAddress => Self::Instant,
            SettlementKind::BankTransfer => Self::BusinessDays { min: 3, max: 5 },
        }
    }
}

impl fmt::Display for SettlementTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instant => f.write_str("instant"),
            Self::BusinessDays { min, max } => write!(f, "{min}-{max} business days"),
            Self::Unknown => f.write_str("N/A"),
        }
    }
}

/// Output of the deterministic fee comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeEstimate {
    pub method: Option<SettlementMethod>,
    pub fee: Decimal,
    pub settlement_time: SettlementTime,
    pub reason: String,
}

impl FeeEstimate {
    pub fn kind(&self) -> Option<SettlementKind> {
        self.method.as_ref().map(SettlementMethod::kind)
    }

    /// Narrative entry describing this estimate.
    pub fn describe(&self) -> String {
        let recommended = self
            .kind()
            .map(|k| k.as_str().to_string())
            .unwrap_or_else(|| "none".to_string());
        format!(
            "Payment Method Analysis:\n- Recommended: {recommended}\n- Reason: {}\n- Fee: ${:.2}\n- Settlement: {}",
            self.reason, self.fee, self.settlement_time
        )
    }
}

/// One entry of the advisory narrative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "content", rename_all = "snake_case")]
pub enum Turn {
    /// The caller's request framed as text.
    Request(String),
    /// A fee comparison result.
    Analysis(String),
    /// Text produced by the generation backend.
    Commentary(String),
}

impl Turn {
    pub fn content(&self) -> &str {
        match self {
            Self::Request(text) | Self::Analysis(text) | Self::Commentary(text) => text,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Narrative(Vec<Turn>);

impl Narrative {
    pub fn seeded(request: impl Into<String>) -> Self {
        Self(vec![Turn::Request(request.into())])
    }

    pub fn push(&mut self, turn: Turn) {
        self.0.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last_commentary(&self) -> Option<&str> {
        self.0.iter().rev().find_map(|turn| match turn {
            Turn::Commentary(text) => Some(text.as_str()),
            _ => None,
        })
    }
}

/// Why the recommendation loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The commentary contained the terminal marker.
    Marker,
    /// The round ceiling was reached without the marker.
    SoftTimeout,
    /// The generation backend failed; only the deterministic estimate is used.
    Degraded,
}

/// The effective result of a recommendation loop run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub method: Option<SettlementMethod>,
    pub fee: Decimal,
    pub settlement_time: SettlementTime,
    /// Last commentary if any, else the estimator's reason.
    pub rationale: String,
    pub commentary: Option<String>,
    pub rounds_taken: u8,
    pub termination: Termination,
    pub notification_requested: bool,
}

impl Recommendation {
    pub fn kind(&self) -> Option<SettlementKind> {
        self.method.as_ref().map(SettlementMethod::kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payee::fixtures::bank_method;
    use rust_decimal_macros::dec;

    #[test]
    fn test_settlement_time_display() {
        assert_eq!(SettlementTime::Instant.to_string(), "instant");
        assert_eq!(
            SettlementTime::for_kind(SettlementKind::BankTransfer).to_string(),
            "3-5 business days"
        );
        assert_eq!(SettlementTime::Unknown.to_string(), "N/A");
    }

    #[test]
    fn test_describe_estimate() {
        let estimate = FeeEstimate {
            method: Some(bank_method(1, false)),
            fee: dec!(30),
            settlement_time: SettlementTime::for_kind(SettlementKind::BankTransfer),
            reason: "ACH is the best available option".to_string(),
        };
        let text = estimate.describe();
        assert!(text.contains("Recommended: US_ACH"));
        assert!(text.contains("Fee: $30.00"));
        assert!(text.contains("Settlement: 3-5 business days"));
    }

    #[test]
    fn test_last_commentary_skips_analysis() {
        let mut narrative = Narrative::seeded("pay 10");
        narrative.push(Turn::Commentary("first".into()));
        narrative.push(Turn::Analysis("table".into()));
        assert_eq!(narrative.last_commentary(), Some("first"));
        assert_eq!(narrative.len(), 3);
    }
}
