#![allow(dead_code)]

use async_trait::async_trait;
use coinnect::application::payees::{MethodRequest, PayeeRequest};
use coinnect::domain::amount::Amount;
use coinnect::domain::payee::{
    AccountHolderType, AccountType, AchDetails, Blockchain, CryptoDetails, MethodDetails,
    SettlementKind, SettlementMethod,
};
use coinnect::domain::ports::{
    GatewayPayee, GatewayPayeeRequest, NotificationPort, PaymentGateway, TextGenerationBackend,
};
use coinnect::domain::recommendation::Narrative;
use coinnect::error::{PaymentError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

pub fn ach_details(number: &str) -> AchDetails {
    AchDetails {
        account_holder_name: "Grace Hopper".to_string(),
        account_holder_type: AccountHolderType::Individual,
        routing_number: "011000015".to_string(),
        account_number: number.to_string(),
        account_type: AccountType::Checking,
    }
}

pub fn crypto_details(wallet: &str) -> CryptoDetails {
    CryptoDetails {
        wallet_address: wallet.to_string(),
        blockchain: Blockchain::Polygon,
    }
}

pub fn bank_method(id: u64) -> SettlementMethod {
    SettlementMethod {
        id,
        external_id: format!("ext-ach-{id}"),
        details: MethodDetails::BankTransfer(ach_details(&format!("99887766{id}"))),
        is_default: false,
    }
}

pub fn stablecoin_method(id: u64) -> SettlementMethod {
    SettlementMethod {
        id,
        external_id: format!("ext-usdc-{id}"),
        details: MethodDetails::StableCoinAddress(crypto_details(&format!("0xfeed{id}"))),
        is_default: false,
    }
}

pub fn bank_request(is_default: bool) -> MethodRequest {
    MethodRequest {
        kind: SettlementKind::BankTransfer,
        is_default,
        ach_details: Some(ach_details("123456789")),
        crypto_details: None,
    }
}

pub fn stablecoin_request(is_default: bool) -> MethodRequest {
    MethodRequest {
        kind: SettlementKind::StableCoinAddress,
        is_default,
        ach_details: None,
        crypto_details: Some(crypto_details("0x71C7656EC7ab88b098defB751B7401B5f6d8976F")),
    }
}

pub fn payee_request(email: &str, methods: Vec<MethodRequest>) -> PayeeRequest {
    PayeeRequest {
        name: "Grace Hopper".to_string(),
        email: email.to_string(),
        contact_details: serde_json::json!({ "country": "US" }),
        payment_methods: methods,
    }
}

pub fn amount(value: Decimal) -> Amount {
    Amount::new(value).unwrap()
}

pub fn thousand() -> Amount {
    amount(dec!(1000))
}

/// Replays canned responses, repeating the last one once exhausted.
pub struct ScriptedBackend {
    responses: Mutex<VecDeque<Result<String>>>,
    last: Mutex<Option<String>>,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_results(responses.into_iter().map(|r| Ok(r.into())))
    }

    pub fn with_results<I: IntoIterator<Item = Result<String>>>(responses: I) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self::with_results([Err(PaymentError::TextGenerationError(
            "backend unreachable".to_string(),
        ))])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerationBackend for ScriptedBackend {
    async fn generate(&self, _system_prompt: &str, _narrative: &Narrative) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.responses.lock().unwrap().pop_front();
        match next {
            Some(Ok(text)) => {
                *self.last.lock().unwrap() = Some(text.clone());
                Ok(text)
            }
            Some(Err(err)) => Err(err),
            None => match self.last.lock().unwrap().clone() {
                Some(text) => Ok(text),
                None => Err(PaymentError::TextGenerationError(
                    "backend unreachable".to_string(),
                )),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentPayment {
    pub external_id: String,
    pub amount: Amount,
    pub memo: Option<String>,
}

/// Gateway double that records registrations and transfers.
#[derive(Default)]
pub struct RecordingGateway {
    pub created: Mutex<Vec<GatewayPayeeRequest>>,
    pub sent: Mutex<Vec<SentPayment>>,
}

impl RecordingGateway {
    pub fn sent(&self) -> Vec<SentPayment> {
        self.sent.lock().unwrap().clone()
    }

    pub fn created(&self) -> Vec<GatewayPayeeRequest> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for RecordingGateway {
    async fn create_payee(&self, request: &GatewayPayeeRequest) -> Result<String> {
        let mut created = self.created.lock().unwrap();
        created.push(request.clone());
        Ok(format!("pd-{}", created.len()))
    }

    async fn send_payment(
        &self,
        external_id: &str,
        amount: Amount,
        memo: Option<&str>,
    ) -> Result<String> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(SentPayment {
            external_id: external_id.to_string(),
            amount,
            memo: memo.map(str::to_string),
        });
        Ok(format!("txn-{}", sent.len()))
    }

    async fn get_balance(&self, _currency: &str) -> Result<Decimal> {
        Ok(dec!(2500.00))
    }

    async fn search_payees(&self) -> Result<Vec<GatewayPayee>> {
        Ok(Vec::new())
    }
}

/// Forwards every notice into a channel so tests can await delivery.
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<(String, Amount)>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(String, Amount)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl NotificationPort for ChannelNotifier {
    async fn notify_cheaper_method_available(&self, email: &str, amount: Amount) -> Result<()> {
        let _ = self.tx.send((email.to_string(), amount));
        Ok(())
    }
}

/// Notifier that always fails; the failure must never reach the caller.
pub struct BrokenNotifier;

#[async_trait]
impl NotificationPort for BrokenNotifier {
    async fn notify_cheaper_method_available(&self, _email: &str, _amount: Amount) -> Result<()> {
        Err(PaymentError::GatewayUnavailable("smtp down".to_string()))
    }
}
