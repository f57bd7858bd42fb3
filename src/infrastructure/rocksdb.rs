use crate::domain::payee::{NewPayee, NewSettlementMethod, Payee, SettlementMethod};
use crate::domain::ports::PayeeStore;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Options, WriteBatch};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for payee records, keyed by id.
pub const CF_PAYEES: &str = "payees";
/// Column Family mapping email to payee id.
pub const CF_EMAILS: &str = "emails";
/// Column Family for id counters.
pub const CF_META: &str = "meta";

const NEXT_PAYEE_ID: &[u8] = b"next_payee_id";
const NEXT_METHOD_ID: &[u8] = b"next_method_id";

/// A persistent payee store implementation using RocksDB.
///
/// Payees are stored as JSON documents with their methods embedded, next to
/// a unique email index. Multi-key updates go through a `WriteBatch`.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBPayeeStore {
    db: Arc<DB>,
    // serialises read-modify-write sequences
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBPayeeStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// # Arguments
    ///
    /// * `path` - The filesystem path where the database will be stored.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = [CF_PAYEES, CF_EMAILS, CF_META]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            PaymentError::InternalError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn read_payee(&self, payee_id: u64) -> Result<Option<Payee>> {
        match self.db.get_cf(self.cf(CF_PAYEES)?, payee_id.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn read_counter(&self, key: &[u8]) -> Result<u64> {
        match self.db.get_cf(self.cf(CF_META)?, key)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    PaymentError::InternalError(Box::new(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "corrupt id counter",
                    )))
                })?;
                Ok(u64::from_be_bytes(raw))
            }
            None => Ok(0),
        }
    }

    fn put_payee(&self, batch: &mut WriteBatch, payee: &Payee) -> Result<()> {
        batch.put_cf(
            self.cf(CF_PAYEES)?,
            payee.id.to_be_bytes(),
            serde_json::to_vec(payee)?,
        );
        Ok(())
    }

    fn existing_payee(&self, payee_id: u64) -> Result<Payee> {
        self.read_payee(payee_id)?
            .ok_or_else(|| PaymentError::PayeeNotFound(payee_id.to_string()))
    }
}

#[async_trait]
impl PayeeStore for RocksDBPayeeStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Payee>> {
        match self.db.get_cf(self.cf(CF_EMAILS)?, email.as_bytes())? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    PaymentError::InternalError(Box::new(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "corrupt email index entry",
                    )))
                })?;
                self.read_payee(u64::from_be_bytes(raw))
            }
            None => Ok(None),
        }
    }

    async fn get(&self, payee_id: u64) -> Result<Option<Payee>> {
        self.read_payee(payee_id)
    }

    async fn create(&self, payee: NewPayee) -> Result<Payee> {
        let _guard = self.write_lock.lock().await;
        if self
            .db
            .get_pinned_cf(self.cf(CF_EMAILS)?, payee.email.as_bytes())?
            .is_some()
        {
            return Err(PaymentError::ValidationError(format!(
                "payee with email {} already exists",
                payee.email
            )));
        }

        let id = self.read_counter(NEXT_PAYEE_ID)? + 1;
        let payee = Payee::new(id, payee);

        let mut batch = WriteBatch::default();
        self.put_payee(&mut batch, &payee)?;
        batch.put_cf(self.cf(CF_EMAILS)?, payee.email.as_bytes(), id.to_be_bytes());
        batch.put_cf(self.cf(CF_META)?, NEXT_PAYEE_ID, id.to_be_bytes());
        self.db.write(batch)?;

        Ok(payee)
    }

    async fn add_method(
        &self,
        payee_id: u64,
        method: NewSettlementMethod,
    ) -> Result<SettlementMethod> {
        let _guard = self.write_lock.lock().await;
        let mut payee = self.existing_payee(payee_id)?;

        let id = self.read_counter(NEXT_METHOD_ID)? + 1;
        let method = SettlementMethod {
            id,
            external_id: method.external_id,
            details: method.details,
            is_default: method.is_default,
        };
        payee.push_method(method.clone());

        let mut batch = WriteBatch::default();
        self.put_payee(&mut batch, &payee)?;
        batch.put_cf(self.cf(CF_META)?, NEXT_METHOD_ID, id.to_be_bytes());
        self.db.write(batch)?;

        Ok(method)
    }

    async fn clear_default_except(&self, payee_id: u64, method_id: u64) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut payee = self.existing_payee(payee_id)?;
        payee.clear_default_except(method_id);

        let mut batch = WriteBatch::default();
        self.put_payee(&mut batch, &payee)?;
        self.db.write(batch)?;
        Ok(())
    }
}
