use crate::config::FeeSchedule;
use crate::domain::amount::Amount;
use crate::domain::payee::SettlementKind;
use crate::domain::ports::NotificationPort;
use crate::domain::recommendation::SettlementTime;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

/// Message telling a payee how much a stablecoin address would have saved.
///
/// Every figure, including the printed percentages, comes from one
/// `FeeSchedule`, so the notice always agrees with the fee estimator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonNotice {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

fn percent(rate: Decimal) -> String {
    (rate * Decimal::ONE_HUNDRED).normalize().to_string()
}

impl ComparisonNotice {
    pub const SUBJECT: &'static str = "Payment Processing Information - USDC Option Available";

    pub fn compose(sender: &str, recipient: &str, amount: Amount, fees: &FeeSchedule) -> Self {
        let bank_fee = amount.scaled(fees.bank_transfer_rate);
        let stablecoin_fee = amount.scaled(fees.stablecoin_rate);
        let savings = bank_fee - stablecoin_fee;

        let body = format!(
            "Hello,

A payment of ${amount} has been initiated to your account via ACH transfer.

Current Payment Details:
- Method: ACH Transfer
- Fee: ${bank_fee:.2} ({bank_rate}%)
- Settlement Time: {bank_time}

You could save on fees by accepting USDC payments:
- Potential Fee with USDC: ${stablecoin_fee:.2} ({stablecoin_rate}%)
- Potential Savings: ${savings:.2}
- Settlement Time: {stablecoin_time}

To start accepting USDC payments and reduce your fees:
1. Reply to this email
2. We'll help you set up a USDC wallet
3. Future payments will be faster and cheaper

Best regards,
Coinnect Team
",
            bank_rate = percent(fees.bank_transfer_rate),
            stablecoin_rate = percent(fees.stablecoin_rate),
            bank_time = SettlementTime::for_kind(SettlementKind::BankTransfer),
            stablecoin_time = SettlementTime::for_kind(SettlementKind::StableCoinAddress),
        );

        Self {
            from: sender.to_string(),
            to: recipient.to_string(),
            subject: Self::SUBJECT.to_string(),
            body,
        }
    }
}

/// Records notices in the log instead of delivering them.
pub struct LogNotifier {
    sender: String,
    fees: FeeSchedule,
}

impl LogNotifier {
    pub fn new(sender: impl Into<String>, fees: FeeSchedule) -> Self {
        Self {
            sender: sender.into(),
            fees,
        }
    }
}

#[async_trait]
impl NotificationPort for LogNotifier {
    async fn notify_cheaper_method_available(&self, email: &str, amount: Amount) -> Result<()> {
        let notice = ComparisonNotice::compose(&self.sender, email, amount, &self.fees);
        info!(to = %notice.to, subject = %notice.subject, "Fee comparison notice composed");
        debug!(to = %notice.to, body = %notice.body, "Fee comparison notice body");
        Ok(())
    }
}

/// Posts notices as JSON to a webhook that handles delivery.
pub struct WebhookNotifier {
    url: String,
    sender: String,
    fees: FeeSchedule,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, sender: impl Into<String>, fees: FeeSchedule) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| PaymentError::InternalError(Box::new(e)))?;

        Ok(Self {
            url: url.into(),
            sender: sender.into(),
            fees,
            client,
        })
    }
}

#[async_trait]
impl NotificationPort for WebhookNotifier {
    async fn notify_cheaper_method_available(&self, email: &str, amount: Amount) -> Result<()> {
        let notice = ComparisonNotice::compose(&self.sender, email, amount, &self.fees);
        let response = self
            .client
            .post(&self.url)
            .json(&notice)
            .send()
            .await
            .map_err(|e| PaymentError::InternalError(Box::new(e)))?;

        if !response.status().is_success() {
            return Err(PaymentError::InternalError(Box::new(std::io::Error::other(
                format!("notification webhook returned {}", response.status()),
            ))));
        }
        info!(to = %notice.to, "Fee comparison notice delivered");
        Ok(())
    }
}
