//! Payman REST API gateway.
//!
//! Authenticates every request with the `x-payman-api-secret` header and maps
//! transport failures onto the gateway error classes the retry layer uses.

use crate::config::PaymanConfig;
use crate::domain::amount::Amount;
use crate::domain::payee::{AccountHolderType, AccountType, Blockchain, MethodDetails};
use crate::domain::ports::{GatewayPayee, GatewayPayeeRequest, PaymentGateway};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const API_SECRET_HEADER: &str = "x-payman-api-secret";

pub struct PaymanGateway {
    config: PaymanConfig,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct CreatePayeeBody<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'a str,
    contact_details: &'a serde_json::Value,
    #[serde(flatten)]
    rail: RailFields<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RailFields<'a> {
    Ach {
        account_holder_name: &'a str,
        account_holder_type: &'a AccountHolderType,
        routing_number: &'a str,
        account_number: &'a str,
        account_type: &'a AccountType,
    },
    Crypto {
        currency: &'static str,
        address: &'a str,
        chain: &'a Blockchain,
    },
}

#[derive(Debug, Deserialize)]
struct CreatePayeeResponse {
    id: String,
}

#[derive(Debug, Serialize)]
struct SendPaymentBody<'a> {
    payee_id: &'a str,
    #[serde(with = "rust_decimal::serde::float")]
    amount_decimal: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    memo: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct SendPaymentResponse {
    reference: String,
}

/// The balance endpoint answers with a bare number or an object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BalanceResponse {
    Plain(Decimal),
    Wrapped {
        #[serde(alias = "spendableBalance", alias = "balance")]
        spendable_balance: Decimal,
    },
}

impl PaymanGateway {
    pub fn new(config: PaymanConfig) -> Result<Self> {
        if config.api_url.trim().is_empty() {
            return Err(PaymentError::ValidationError(
                "payman api_url must not be empty".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PaymentError::InternalError(Box::new(e)))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &PaymanConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_url.trim_end_matches('/'), path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(self.url(path))
            .header(API_SECRET_HEADER, &self.config.api_secret)
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;
        self.handle_response(response).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let response = self
            .client
            .post(self.url(path))
            .header(API_SECRET_HEADER, &self.config.api_secret)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;
        self.handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(self.map_status_error(status.as_u16(), &error_text));
        }

        response.json::<T>().await.map_err(|e| {
            PaymentError::GatewayRejected(format!("Unexpected Payman response: {e}"))
        })
    }

    fn map_status_error(&self, status: u16, error_text: &str) -> PaymentError {
        match status {
            429 | 500..=599 => {
                PaymentError::GatewayUnavailable(format!("Payman returned {status}: {error_text}"))
            }
            _ => PaymentError::GatewayRejected(format!("Payman returned {status}: {error_text}")),
        }
    }

    fn map_reqwest_error(&self, e: reqwest::Error) -> PaymentError {
        if e.is_connect() {
            PaymentError::GatewayConnect(format!("{}: {e}", self.config.api_url))
        } else {
            PaymentError::GatewayUnavailable(format!("Payman request failed: {e}"))
        }
    }
}

fn create_payee_body(request: &GatewayPayeeRequest) -> CreatePayeeBody<'_> {
    let rail = match &request.details {
        MethodDetails::BankTransfer(ach) => RailFields::Ach {
            account_holder_name: &ach.account_holder_name,
            account_holder_type: &ach.account_holder_type,
            routing_number: &ach.routing_number,
            account_number: &ach.account_number,
            account_type: &ach.account_type,
        },
        MethodDetails::StableCoinAddress(crypto) => RailFields::Crypto {
            currency: "USDC",
            address: &crypto.wallet_address,
            chain: &crypto.blockchain,
        },
    };
    CreatePayeeBody {
        kind: request.details.kind().as_str(),
        name: &request.name,
        contact_details: &request.contact_details,
        rail,
    }
}

#[async_trait]
impl PaymentGateway for PaymanGateway {
    async fn create_payee(&self, request: &GatewayPayeeRequest) -> Result<String> {
        let response: CreatePayeeResponse = self
            .post("payments/payees", &create_payee_body(request))
            .await?;
        debug!(payee = %response.id, kind = %request.details.kind(), "Gateway payee created");
        Ok(response.id)
    }

    async fn send_payment(
        &self,
        external_id: &str,
        amount: Amount,
        memo: Option<&str>,
    ) -> Result<String> {
        let body = SendPaymentBody {
            payee_id: external_id,
            amount_decimal: amount.value(),
            memo,
        };
        let response: SendPaymentResponse = self.post("payments/send-payment", &body).await?;
        Ok(response.reference)
    }

    async fn get_balance(&self, currency: &str) -> Result<Decimal> {
        let response: BalanceResponse = self
            .get(&format!("balances/currencies/{currency}"))
            .await?;
        Ok(match response {
            BalanceResponse::Plain(value) => value,
            BalanceResponse::Wrapped { spendable_balance } => spendable_balance,
        })
    }

    async fn search_payees(&self) -> Result<Vec<GatewayPayee>> {
        self.get("payments/search-payees").await
    }
}
