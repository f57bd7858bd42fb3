use super::amount::Amount;
use super::payee::{MethodDetails, NewPayee, NewSettlementMethod, Payee, SettlementMethod};
use super::recommendation::Narrative;
use crate::error::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Relational persistence of payees and their settlement methods.
#[async_trait]
pub trait PayeeStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Payee>>;
    async fn get(&self, payee_id: u64) -> Result<Option<Payee>>;
    async fn create(&self, payee: NewPayee) -> Result<Payee>;
    async fn add_method(&self, payee_id: u64, method: NewSettlementMethod)
    -> Result<SettlementMethod>;
    async fn clear_default_except(&self, payee_id: u64, method_id: u64) -> Result<()>;
}

/// Payee registration request sent to the payments gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayPayeeRequest {
    pub name: String,
    pub details: MethodDetails,
    pub contact_details: serde_json::Value,
}

/// A payee record as the gateway reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayPayee {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Third-party ledger executing payee creation, balance queries and transfers.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Returns the gateway's identifier for the new payee.
    async fn create_payee(&self, request: &GatewayPayeeRequest) -> Result<String>;
    /// Returns the gateway's transaction reference.
    async fn send_payment(&self, external_id: &str, amount: Amount, memo: Option<&str>)
    -> Result<String>;
    async fn get_balance(&self, currency: &str) -> Result<Decimal>;
    async fn search_payees(&self) -> Result<Vec<GatewayPayee>>;
}

/// Delivers a notice that a cheaper settlement rail could have been used.
#[async_trait]
pub trait NotificationPort: Send + Sync {
    async fn notify_cheaper_method_available(&self, email: &str, amount: Amount) -> Result<()>;
}

/// Black-box text generation over the advisory narrative.
#[async_trait]
pub trait TextGenerationBackend: Send + Sync {
    async fn generate(&self, system_prompt: &str, narrative: &Narrative) -> Result<String>;
}

pub type PayeeStoreBox = Box<dyn PayeeStore>;
pub type PayeeStoreFactory = Box<dyn Fn() -> PayeeStoreBox + Send + Sync>;
pub type PaymentGatewayBox = Box<dyn PaymentGateway>;
pub type GatewayHandle = Arc<dyn PaymentGateway>;
pub type TextGenerationBox = Box<dyn TextGenerationBackend>;
/// Shared so notices can be dispatched from detached tasks.
pub type NotifierHandle = Arc<dyn NotificationPort>;
