use super::TransactionOption;
use crate::core::{KeyRange, KeyValue, StoreError, StoreResult};
use async_trait::async_trait;
use tracing::{Level, event};

/// A single store transaction.
///
/// Mutations are buffered locally and only become visible on `commit`.
/// After a failed commit the transaction is handed to `on_error`, which
/// waits out the store's backoff and resets it for another attempt, or
/// returns the error if it is not worth retrying.
#[async_trait]
pub trait Transaction: Send {
    fn set_option(&mut self, option: TransactionOption) -> StoreResult<()>;

    async fn get(&mut self, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    /// Reads up to `limit` pairs from `range` in key order.
    async fn get_range(&mut self, range: &KeyRange, limit: usize) -> StoreResult<Vec<KeyValue>>;

    fn set(&mut self, key: &[u8], value: &[u8]);

    fn clear(&mut self, key: &[u8]);

    fn clear_range(&mut self, range: &KeyRange);

    /// Makes the commit fail if `key` is written by another transaction
    /// after this one's read version.
    fn add_read_conflict_key(&mut self, key: &[u8]) -> StoreResult<()>;

    async fn commit(&mut self) -> StoreResult<()>;

    /// Discards buffered mutations, options and conflict ranges.
    fn reset(&mut self);

    async fn on_error(&mut self, error: StoreError) -> StoreResult<()>;
}

/// An open store handle.
pub trait Database: Send + Sync {
    fn create_transaction(&self) -> StoreResult<Box<dyn Transaction>>;
}

/// Runs `body` and commits, retrying through `on_error` until the commit
/// succeeds or the store reports a non-retryable error.
///
/// `body` runs once per attempt against a freshly reset transaction.
pub async fn transact<F>(database: &dyn Database, mut body: F) -> StoreResult<()>
where
    F: FnMut(&mut dyn Transaction) -> StoreResult<()> + Send,
{
    let mut tr = database.create_transaction()?;
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let outcome = match body(tr.as_mut()) {
            Ok(()) => tr.commit().await,
            Err(err) => Err(err),
        };
        match outcome {
            Ok(()) => return Ok(()),
            Err(err) => {
                event!(Level::DEBUG, attempt, code = err.code, error = %err, "transaction attempt failed");
                tr.on_error(err).await?;
            }
        }
    }
}
