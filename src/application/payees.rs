use crate::domain::payee::{
    AchDetails, CryptoDetails, MethodDetails, NewPayee, NewSettlementMethod, Payee,
    SettlementKind,
};
use crate::domain::ports::{GatewayHandle, GatewayPayeeRequest, PayeeStoreBox};
use crate::error::{PaymentError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// A settlement method as submitted by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodRequest {
    #[serde(rename = "type")]
    pub kind: SettlementKind,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub ach_details: Option<AchDetails>,
    #[serde(default)]
    pub crypto_details: Option<CryptoDetails>,
}

impl MethodRequest {
    /// Picks the details block matching the declared type.
    pub fn details(&self) -> Result<MethodDetails> {
        let details = match self.kind {
            SettlementKind::BankTransfer => self
                .ach_details
                .clone()
                .map(MethodDetails::BankTransfer),
            SettlementKind::StableCoinAddress => self
                .crypto_details
                .clone()
                .map(MethodDetails::StableCoinAddress),
        }
        .ok_or_else(|| {
            PaymentError::ValidationError(format!("{} method is missing its details", self.kind))
        })?;
        details.validate()?;
        Ok(details)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayeeRequest {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub contact_details: serde_json::Value,
    pub payment_methods: Vec<MethodRequest>,
}

impl PayeeRequest {
    pub fn validate(&self) -> Result<Vec<MethodDetails>> {
        if self.name.trim().is_empty() {
            return Err(PaymentError::ValidationError(
                "name must not be empty".to_string(),
            ));
        }
        if !is_plausible_email(&self.email) {
            return Err(PaymentError::ValidationError(format!(
                "invalid email: {}",
                self.email
            )));
        }
        if self.payment_methods.is_empty() {
            return Err(PaymentError::ValidationError(
                "at least one payment method is required".to_string(),
            ));
        }
        self.payment_methods.iter().map(MethodRequest::details).collect()
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.trim().split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    }
}

/// Registers payees locally and at the payments gateway.
pub struct PayeeService {
    store: PayeeStoreBox,
    gateway: GatewayHandle,
}

impl PayeeService {
    pub fn new(store: PayeeStoreBox, gateway: GatewayHandle) -> Self {
        Self { store, gateway }
    }

    pub fn store(&self) -> &PayeeStoreBox {
        &self.store
    }

    /// Creates the payee on first reference by email, then appends each method.
    ///
    /// Everything is validated before anything is written.
    pub async fn register(&self, request: PayeeRequest) -> Result<Payee> {
        let details = request.validate()?;
        let email = request.email.trim().to_lowercase();

        let payee = match self.store.find_by_email(&email).await? {
            Some(existing) => existing,
            None => {
                self.store
                    .create(NewPayee {
                        name: request.name.clone(),
                        email: email.clone(),
                        contact_details: request.contact_details.clone(),
                    })
                    .await?
            }
        };

        for (method, details) in request.payment_methods.iter().zip(details) {
            let external_id = self
                .gateway
                .create_payee(&GatewayPayeeRequest {
                    name: request.name.clone(),
                    details: details.clone(),
                    contact_details: request.contact_details.clone(),
                })
                .await?;

            let stored = self
                .store
                .add_method(
                    payee.id,
                    NewSettlementMethod {
                        external_id,
                        details,
                        is_default: method.is_default,
                    },
                )
                .await?;

            if stored.is_default {
                self.store.clear_default_except(payee.id, stored.id).await?;
            }
            info!(payee = payee.id, method = stored.id, kind = %stored.kind(), "Settlement method registered");
        }

        self.store
            .get(payee.id)
            .await?
            .ok_or_else(|| PaymentError::PayeeNotFound(email))
    }

    /// Loads a payee already registered at the gateway, e.g. from an earlier
    /// `register` report. The gateway is not contacted; methods whose
    /// external id is already stored are skipped.
    pub async fn restore(&self, payee: Payee) -> Result<Payee> {
        let email = payee.email.trim().to_lowercase();
        let existing = match self.store.find_by_email(&email).await? {
            Some(existing) => existing,
            None => {
                self.store
                    .create(NewPayee {
                        name: payee.name.clone(),
                        email: email.clone(),
                        contact_details: payee.contact_details.clone(),
                    })
                    .await?
            }
        };

        for method in payee.methods {
            if existing
                .methods
                .iter()
                .any(|m| m.external_id == method.external_id)
            {
                continue;
            }
            method.details.validate()?;
            let stored = self
                .store
                .add_method(
                    existing.id,
                    NewSettlementMethod {
                        external_id: method.external_id,
                        details: method.details,
                        is_default: method.is_default,
                    },
                )
                .await?;
            if stored.is_default {
                self.store.clear_default_except(existing.id, stored.id).await?;
            }
        }
        debug!(payee = existing.id, %email, "Payee restored");

        self.store
            .get(existing.id)
            .await?
            .ok_or(PaymentError::PayeeNotFound(email))
    }

    pub async fn find(&self, email: &str) -> Result<Payee> {
        let email = email.trim().to_lowercase();
        self.store
            .find_by_email(&email)
            .await?
            .ok_or(PaymentError::PayeeNotFound(email))
    }
}
