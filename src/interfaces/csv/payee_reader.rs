use crate::application::payees::{MethodRequest, PayeeRequest};
use crate::domain::payee::{
    AccountHolderType, AccountType, AchDetails, Blockchain, CryptoDetails, SettlementKind,
};
use crate::error::{PaymentError, Result};
use serde::Deserialize;
use std::io::Read;

/// One settlement method of one payee, as a flat CSV row.
///
/// Rail-specific columns are left empty when they do not apply.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct PayeeRecord {
    pub name: String,
    pub email: String,
    #[serde(rename = "type")]
    pub kind: SettlementKind,
    #[serde(default)]
    pub is_default: bool,
    pub account_holder_name: Option<String>,
    pub account_holder_type: Option<AccountHolderType>,
    pub routing_number: Option<String>,
    pub account_number: Option<String>,
    pub account_type: Option<AccountType>,
    pub wallet_address: Option<String>,
    pub blockchain: Option<Blockchain>,
}

impl PayeeRecord {
    fn method(self) -> Result<MethodRequest> {
        let missing = |column: &str| {
            PaymentError::ValidationError(format!(
                "{} row for {} is missing {column}",
                self.kind, self.email
            ))
        };

        let (ach_details, crypto_details) = match self.kind {
            SettlementKind::BankTransfer => (
                Some(AchDetails {
                    account_holder_name: self
                        .account_holder_name
                        .clone()
                        .unwrap_or_else(|| self.name.clone()),
                    account_holder_type: self
                        .account_holder_type
                        .unwrap_or(AccountHolderType::Individual),
                    routing_number: self
                        .routing_number
                        .clone()
                        .ok_or_else(|| missing("routing_number"))?,
                    account_number: self
                        .account_number
                        .clone()
                        .ok_or_else(|| missing("account_number"))?,
                    account_type: self.account_type.unwrap_or(AccountType::Checking),
                }),
                None,
            ),
            SettlementKind::StableCoinAddress => (
                None,
                Some(CryptoDetails {
                    wallet_address: self
                        .wallet_address
                        .clone()
                        .ok_or_else(|| missing("wallet_address"))?,
                    blockchain: self.blockchain.ok_or_else(|| missing("blockchain"))?,
                }),
            ),
        };

        Ok(MethodRequest {
            kind: self.kind,
            is_default: self.is_default,
            ach_details,
            crypto_details,
        })
    }
}

/// Reads payee method rows from a CSV source.
///
/// Wraps `csv::Reader` with whitespace trimming and flexible record lengths.
pub struct PayeeReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> PayeeReader<R> {
    /// Creates a new `PayeeReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes rows.
    pub fn records(self) -> impl Iterator<Item = Result<PayeeRecord>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(PaymentError::from))
    }

    /// Groups rows into one request per email, in order of first appearance.
    ///
    /// Rows that fail to parse are returned separately with their line number
    /// so one bad row does not drop the rest of the file.
    pub fn requests(self) -> (Vec<PayeeRequest>, Vec<(usize, PaymentError)>) {
        let mut requests: Vec<PayeeRequest> = Vec::new();
        let mut errors = Vec::new();

        // header is line 1
        for (line, record) in (2..).zip(self.records()) {
            let record = match record {
                Ok(record) => record,
                Err(err) => {
                    errors.push((line, err));
                    continue;
                }
            };
            let name = record.name.clone();
            let email = record.email.to_lowercase();
            let method = match record.method() {
                Ok(method) => method,
                Err(err) => {
                    errors.push((line, err));
                    continue;
                }
            };

            match requests.iter_mut().find(|r| r.email == email) {
                Some(request) => request.payment_methods.push(method),
                None => requests.push(PayeeRequest {
                    name,
                    email,
                    contact_details: serde_json::Value::Object(Default::default()),
                    payment_methods: vec![method],
                }),
            }
        }

        (requests, errors)
    }
}
