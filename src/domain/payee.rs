use crate::error::{PaymentError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Settlement rail a payee can be paid through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SettlementKind {
    #[serde(rename = "US_ACH")]
    BankTransfer,
    #[serde(rename = "CRYPTO_ADDRESS")]
    StableCoinAddress,
}

impl SettlementKind {
    /// Name used by the payments gateway for this rail.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BankTransfer => "US_ACH",
            Self::StableCoinAddress => "CRYPTO_ADDRESS",
        }
    }
}

impl fmt::Display for SettlementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettlementKind {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "US_ACH" | "ACH" | "BANK_TRANSFER" => Ok(Self::BankTransfer),
            "CRYPTO_ADDRESS" | "USDC" | "STABLECOIN" => Ok(Self::StableCoinAddress),
            other => Err(PaymentError::ValidationError(format!(
                "Unknown settlement method type: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountHolderType {
    Individual,
    Business,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Checking,
    Savings,
}

/// Chains a stablecoin address may live on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Blockchain {
    Ethereum,
    Polygon,
    Base,
    Arbitrum,
    Avalanche,
    Optimism,
    Solana,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchDetails {
    pub account_holder_name: String,
    pub account_holder_type: AccountHolderType,
    pub routing_number: String,
    pub account_number: String,
    pub account_type: AccountType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptoDetails {
    pub wallet_address: String,
    pub blockchain: Blockchain,
}

/// Rail-specific account data of a settlement method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum MethodDetails {
    #[serde(rename = "US_ACH")]
    BankTransfer(AchDetails),
    #[serde(rename = "CRYPTO_ADDRESS")]
    StableCoinAddress(CryptoDetails),
}

impl MethodDetails {
    pub fn kind(&self) -> SettlementKind {
        match self {
            Self::BankTransfer(_) => SettlementKind::BankTransfer,
            Self::StableCoinAddress(_) => SettlementKind::StableCoinAddress,
        }
    }

    /// Account number for bank transfers, wallet address for stablecoins.
    pub fn identifier(&self) -> &str {
        match self {
            Self::BankTransfer(ach) => &ach.account_number,
            Self::StableCoinAddress(crypto) => &crypto.wallet_address,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let missing = |field: &str| {
            Err(PaymentError::ValidationError(format!(
                "{field} must not be empty"
            )))
        };
        match self {
            Self::BankTransfer(ach) => {
                if ach.account_holder_name.trim().is_empty() {
                    return missing("account_holder_name");
                }
                if ach.routing_number.trim().is_empty() {
                    return missing("routing_number");
                }
                if ach.account_number.trim().is_empty() {
                    return missing("account_number");
                }
            }
            Self::StableCoinAddress(crypto) => {
                if crypto.wallet_address.trim().is_empty() {
                    return missing("wallet_address");
                }
            }
        }
        Ok(())
    }
}

/// A settlement method registered for a payee.
///
/// Only `is_default` changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementMethod {
    pub id: u64,
    /// Identifier of the matching payee record at the payments gateway.
    pub external_id: String,
    pub details: MethodDetails,
    pub is_default: bool,
}

impl SettlementMethod {
    pub fn kind(&self) -> SettlementKind {
        self.details.kind()
    }

    pub fn identifier(&self) -> &str {
        self.details.identifier()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSettlementMethod {
    pub external_id: String,
    pub details: MethodDetails,
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payee {
    pub id: u64,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub contact_details: serde_json::Value,
    #[serde(default)]
    pub methods: Vec<SettlementMethod>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPayee {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub contact_details: serde_json::Value,
}

impl Payee {
    pub fn new(id: u64, payee: NewPayee) -> Self {
        Self {
            id,
            name: payee.name,
            email: payee.email,
            contact_details: payee.contact_details,
            methods: Vec::new(),
        }
    }

    /// Appends a method, keeping at most one default across the payee.
    pub fn push_method(&mut self, method: SettlementMethod) {
        let id = method.id;
        let is_default = method.is_default;
        self.methods.push(method);
        if is_default {
            self.clear_default_except(id);
        }
    }

    /// Unsets the default flag on every method other than `method_id`.
    pub fn clear_default_except(&mut self, method_id: u64) {
        for method in self.methods.iter_mut().filter(|m| m.id != method_id) {
            method.is_default = false;
        }
    }

    pub fn default_method(&self) -> Option<&SettlementMethod> {
        self.methods.iter().find(|m| m.is_default)
    }

    /// The default method, or the first registered one.
    pub fn preferred_method(&self) -> Option<&SettlementMethod> {
        self.default_method().or_else(|| self.methods.first())
    }

    pub fn method(&self, method_id: u64) -> Option<&SettlementMethod> {
        self.methods.iter().find(|m| m.id == method_id)
    }
}
