use super::payees::PayeeService;
use super::recommendation_loop::{RecommendationLoop, RecommendationRequest};
use crate::domain::amount::Amount;
use crate::domain::payee::{Payee, SettlementKind, SettlementMethod};
use crate::domain::ports::{GatewayHandle, GatewayPayee};
use crate::domain::recommendation::{SettlementTime, Termination};
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};

fn default_currency() -> String {
    "USD".to_string()
}

/// A payment to analyse or execute for a registered payee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRequest {
    pub recipient_email: String,
    #[serde(default)]
    pub recipient_name: Option<String>,
    pub amount: Amount,
    #[serde(default = "default_currency")]
    pub source_currency: String,
    #[serde(default)]
    pub destination_currency: Option<String>,
    #[serde(default)]
    pub recipient_country: Option<String>,
    #[serde(default)]
    pub payment_urgency: Option<String>,
}

impl OptimizationRequest {
    pub fn new(recipient_email: impl Into<String>, amount: Amount) -> Self {
        Self {
            recipient_email: recipient_email.into(),
            recipient_name: None,
            amount,
            source_currency: default_currency(),
            destination_currency: None,
            recipient_country: None,
            payment_urgency: None,
        }
    }

    /// Opening narrative entry for the advisory loop.
    pub fn narrative_seed(&self, payee: &Payee) -> String {
        let name = self.recipient_name.as_deref().unwrap_or(&payee.name);
        let unspecified = "unspecified";
        format!(
            "Analyze payment optimization for:\nAmount: {} {}\nRecipient: {} ({})\nCountry: {}\nUrgency: {}",
            self.amount,
            self.source_currency,
            name,
            payee.email,
            self.recipient_country.as_deref().unwrap_or(unspecified),
            self.payment_urgency.as_deref().unwrap_or(unspecified),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipientAnalysis {
    pub has_stablecoin_method: bool,
    pub recommended_method: Option<SettlementKind>,
    pub estimated_fees: BTreeMap<SettlementKind, Decimal>,
    pub estimated_settlement_time: BTreeMap<SettlementKind, String>,
    pub optimal_route: String,
    pub rounds_taken: u8,
    pub termination: Termination,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentResult {
    pub success: bool,
    pub transaction_id: String,
    pub payment_method_used: SettlementKind,
    pub fee: Decimal,
    /// Bank-transfer fee minus the fee of the rail actually used.
    pub fees_saved: Decimal,
    pub settlement_time: String,
    /// False when the loop produced no method (it failed, or had nothing to
    /// choose from) and the payee's preferred method was paid instead.
    pub recommendation_used: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub payee_id: String,
    pub amount: Amount,
    pub transaction_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceReport {
    pub currency: String,
    pub spendable: Decimal,
}

/// Entry point for payment operations.
///
/// Owns every collaborator; built once at process start.
pub struct PaymentService {
    payees: PayeeService,
    gateway: GatewayHandle,
    advisor: RecommendationLoop,
}

impl PaymentService {
    pub fn new(payees: PayeeService, gateway: GatewayHandle, advisor: RecommendationLoop) -> Self {
        Self {
            payees,
            gateway,
            advisor,
        }
    }

    pub fn payees(&self) -> &PayeeService {
        &self.payees
    }

    /// Pass-through transfer to a gateway payee.
    pub async fn send_payment(&self, payee_id: &str, amount: Amount) -> Result<PaymentReceipt> {
        if payee_id.trim().is_empty() {
            return Err(PaymentError::ValidationError(
                "payee_id must not be empty".to_string(),
            ));
        }
        let transaction_id = self.gateway.send_payment(payee_id, amount, None).await?;
        info!(%payee_id, %amount, %transaction_id, "Payment sent");
        Ok(PaymentReceipt {
            payee_id: payee_id.to_string(),
            amount,
            transaction_id,
        })
    }

    pub async fn balance(&self, currency: &str) -> Result<BalanceReport> {
        let currency = currency.trim().to_uppercase();
        let spendable = self.gateway.get_balance(&currency).await?;
        Ok(BalanceReport {
            currency,
            spendable,
        })
    }

    pub async fn search_payees(&self) -> Result<Vec<GatewayPayee>> {
        self.gateway.search_payees().await
    }

    /// Runs the advisory loop and reports fees and settlement per rail.
    pub async fn optimize(&self, request: &OptimizationRequest) -> Result<RecipientAnalysis> {
        let payee = self.payees.find(&request.recipient_email).await?;
        let recommendation = self
            .advisor
            .recommend(self.recommendation_request(&payee, request))
            .await?;

        let estimator = self.advisor.estimator();
        let rails = [SettlementKind::StableCoinAddress, SettlementKind::BankTransfer];

        Ok(RecipientAnalysis {
            has_stablecoin_method: payee
                .methods
                .iter()
                .any(|m| m.kind() == SettlementKind::StableCoinAddress),
            recommended_method: recommendation.kind(),
            estimated_fees: rails
                .iter()
                .map(|&kind| (kind, estimator.fee_for(kind, request.amount)))
                .collect(),
            estimated_settlement_time: rails
                .iter()
                .map(|&kind| (kind, SettlementTime::for_kind(kind).to_string()))
                .collect(),
            optimal_route: recommendation.rationale,
            rounds_taken: recommendation.rounds_taken,
            termination: recommendation.termination,
        })
    }

    /// Chooses a rail and transfers the funds.
    ///
    /// A failed recommendation falls back to the payee's preferred method;
    /// only gateway errors during the transfer fail the request.
    pub async fn execute(&self, request: &OptimizationRequest) -> Result<PaymentResult> {
        let payee = self.payees.find(&request.recipient_email).await?;

        let recommended = match self
            .advisor
            .recommend(self.recommendation_request(&payee, request))
            .await
        {
            Ok(recommendation) => recommendation.method,
            Err(err) => {
                warn!(payee = payee.id, error = %err, "No recommendation, using preferred method");
                None
            }
        };
        let recommendation_used = recommended.is_some();
        let method: SettlementMethod = match recommended {
            Some(method) => method,
            None => payee.preferred_method().cloned().ok_or_else(|| {
                PaymentError::ValidationError(format!(
                    "payee {} has no settlement methods",
                    payee.email
                ))
            })?,
        };

        let memo = format!(
            "Optimized payment to {}",
            request.recipient_name.as_deref().unwrap_or(&payee.name)
        );
        let transaction_id = self
            .gateway
            .send_payment(&method.external_id, request.amount, Some(&memo))
            .await?;

        let kind = method.kind();
        let estimator = self.advisor.estimator();
        let fee = estimator.fee_for(kind, request.amount);
        let fees_saved = estimator.fee_for(SettlementKind::BankTransfer, request.amount) - fee;
        let settlement_time = SettlementTime::for_kind(kind).to_string();

        info!(payee = payee.id, %kind, %fee, %transaction_id, "Optimized payment sent");

        Ok(PaymentResult {
            success: true,
            transaction_id,
            payment_method_used: kind,
            fee,
            fees_saved,
            message: format!("Payment successfully processed via {kind}, settling {settlement_time}"),
            settlement_time,
            recommendation_used,
        })
    }

    /// Waits for fee comparison notices still being delivered.
    pub async fn drain_notifications(&self, limit: Duration) -> usize {
        self.advisor.drain_notices(limit).await
    }

    fn recommendation_request(
        &self,
        payee: &Payee,
        request: &OptimizationRequest,
    ) -> RecommendationRequest {
        RecommendationRequest {
            amount: request.amount,
            methods: payee.methods.clone(),
            narrative_seed: request.narrative_seed(payee),
            recipient_email: Some(payee.email.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payee::NewPayee;
    use rust_decimal_macros::dec;

    #[test]
    fn test_narrative_seed_mentions_request() {
        let payee = Payee::new(
            1,
            NewPayee {
                name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
                contact_details: serde_json::Value::Null,
            },
        );
        let mut request = OptimizationRequest::new("ada@example.com", Amount::new(dec!(250)).unwrap());
        request.recipient_country = Some("MX".to_string());

        let seed = request.narrative_seed(&payee);
        assert!(seed.contains("Amount: 250.00 USD"));
        assert!(seed.contains("Recipient: Ada (ada@example.com)"));
        assert!(seed.contains("Country: MX"));
        assert!(seed.contains("Urgency: unspecified"));
    }

    #[test]
    fn test_request_defaults_currency() {
        let request: OptimizationRequest =
            serde_json::from_str(r#"{"recipient_email": "a@b.co", "amount": 10}"#).unwrap();
        assert_eq!(request.source_currency, "USD");
        assert!(request.payment_urgency.is_none());
    }

    #[test]
    fn test_request_rejects_zero_amount() {
        let result = serde_json::from_str::<OptimizationRequest>(
            r#"{"recipient_email": "a@b.co", "amount": 0}"#,
        );
        assert!(result.is_err());
    }
}
