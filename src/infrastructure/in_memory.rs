use crate::domain::payee::{NewPayee, NewSettlementMethod, Payee, SettlementMethod};
use crate::domain::ports::PayeeStore;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    payees: HashMap<u64, Payee>,
    emails: HashMap<String, u64>,
    next_payee_id: u64,
    next_method_id: u64,
}

/// A thread-safe in-memory payee store.
///
/// Payees and the email index live behind one `RwLock` so the unique-email
/// rule and id allocation are checked and applied atomically.
#[derive(Default, Clone)]
pub struct InMemoryPayeeStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryPayeeStore {
    /// Creates a new, empty in-memory payee store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PayeeStore for InMemoryPayeeStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Payee>> {
        let tables = self.tables.read().await;
        Ok(tables
            .emails
            .get(email)
            .and_then(|id| tables.payees.get(id))
            .cloned())
    }

    async fn get(&self, payee_id: u64) -> Result<Option<Payee>> {
        let tables = self.tables.read().await;
        Ok(tables.payees.get(&payee_id).cloned())
    }

    async fn create(&self, payee: NewPayee) -> Result<Payee> {
        let mut tables = self.tables.write().await;
        if tables.emails.contains_key(&payee.email) {
            return Err(PaymentError::ValidationError(format!(
                "payee with email {} already exists",
                payee.email
            )));
        }

        tables.next_payee_id += 1;
        let payee = Payee::new(tables.next_payee_id, payee);
        tables.emails.insert(payee.email.clone(), payee.id);
        tables.payees.insert(payee.id, payee.clone());
        Ok(payee)
    }

    async fn add_method(
        &self,
        payee_id: u64,
        method: NewSettlementMethod,
    ) -> Result<SettlementMethod> {
        let mut tables = self.tables.write().await;
        tables.next_method_id += 1;
        let method = SettlementMethod {
            id: tables.next_method_id,
            external_id: method.external_id,
            details: method.details,
            is_default: method.is_default,
        };

        let payee = tables
            .payees
            .get_mut(&payee_id)
            .ok_or_else(|| PaymentError::PayeeNotFound(payee_id.to_string()))?;
        payee.push_method(method.clone());
        Ok(method)
    }

    async fn clear_default_except(&self, payee_id: u64, method_id: u64) -> Result<()> {
        let mut tables = self.tables.write().await;
        let payee = tables
            .payees
            .get_mut(&payee_id)
            .ok_or_else(|| PaymentError::PayeeNotFound(payee_id.to_string()))?;
        payee.clear_default_except(method_id);
        Ok(())
    }
}
