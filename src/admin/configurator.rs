// ============================================================================
// Database Configurator
// ============================================================================
//
// Writes the configuration keys in one transaction and drives retries:
//
//   Start ──build keys──> Applying ──commit ok──────────────────> Done
//     │                     │  │
//     │                     │  └─contention & new db──> RaceCheck ──token ours──> Done
//     │                     │                              │
//     │                     │                              └─token differs──> Fatal
//     │                     └─other error──> Retrying ──retryable──> Applying
//     │                                        │
//     └─invalid config──> Fatal                └─not retryable──> Fatal
//
// A new-database attempt writes a random token to the init marker key. When
// the commit reports contention, reading the marker back tells us whether
// our write landed (lost response) or a concurrent bootstrap won.
//
// ============================================================================

use crate::configuration::{DatabaseConfiguration, INIT_ID_KEY, INITIALIZED_KEY};
use crate::connection::ApplyRetryPolicy;
use crate::core::{AdminError, KeyValue, Result, StoreError, StoreResult};
use crate::transaction::{Database, Transaction, TransactionOption};
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, Level, event, info_span};
use uuid::Uuid;

/// Random identifier written by one new-database attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttemptToken(Uuid);

impl AttemptToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Exact byte comparison against a value read from the marker key.
    pub fn matches(&self, stored: &[u8]) -> bool {
        stored == self.as_bytes().as_slice()
    }
}

impl std::fmt::Display for AttemptToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// How a successful apply finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyReport {
    /// Transaction attempts made, counting the first.
    pub attempts: u32,

    /// Keys written by the attempt that committed. Unknown (zero) when the
    /// outcome was established by the race check.
    pub writes: usize,

    /// The commit reported contention but the init marker holds our token.
    pub confirmed_by_race_check: bool,
}

pub struct DatabaseConfigurator {
    database: Arc<dyn Database>,
    retry: ApplyRetryPolicy,
}

impl DatabaseConfigurator {
    pub fn new(database: Arc<dyn Database>) -> Self {
        Self::with_retry(database, ApplyRetryPolicy::default())
    }

    pub fn with_retry(database: Arc<dyn Database>, retry: ApplyRetryPolicy) -> Self {
        Self { database, retry }
    }

    pub fn retry_policy(&self) -> &ApplyRetryPolicy {
        &self.retry
    }

    /// Applies `configuration` to the database.
    ///
    /// With `new_database` set, every configuration key is written
    /// unconditionally alongside the init marker; losing a bootstrap race
    /// to another caller yields [`AdminError::AlreadyInitialized`].
    /// Otherwise only keys whose stored value differs are written.
    pub async fn apply(
        &self,
        configuration: &DatabaseConfiguration,
        new_database: bool,
    ) -> Result<ApplyReport> {
        let keys = configuration.configuration_keys()?;
        let span = info_span!(
            "coordinator.configure",
            replication_mode = %configuration.replication_mode,
            storage_engine = %configuration.storage_engine,
            new_database
        );
        self.apply_keys(&keys, new_database).instrument(span).await
    }

    async fn apply_keys(&self, keys: &[KeyValue], new_database: bool) -> Result<ApplyReport> {
        let token = new_database.then(AttemptToken::generate);
        if let Some(token) = &token {
            event!(Level::DEBUG, token = %token, "generated attempt token");
        }

        let started = Instant::now();
        let mut tr = self.database.create_transaction()?;
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            let err = match apply_in_transaction(tr.as_mut(), keys, token.as_ref()).await {
                Ok(writes) => {
                    event!(Level::INFO, attempts, writes, "database configuration committed");
                    return Ok(ApplyReport {
                        attempts,
                        writes,
                        confirmed_by_race_check: false,
                    });
                }
                Err(err) => err,
            };

            if let Some(token) = token.as_ref().filter(|_| err.is_new_database_contention()) {
                event!(
                    Level::WARN,
                    attempts,
                    code = err.code,
                    "new database commit contended; checking init marker"
                );
                tr.reset();
                self.check_attempt_token(tr.as_mut(), token, started).await?;
                event!(Level::INFO, attempts, "init marker holds our token; configuration applied");
                return Ok(ApplyReport {
                    attempts,
                    writes: 0,
                    confirmed_by_race_check: true,
                });
            }

            self.ensure_can_retry(attempts, started, &err)?;
            event!(Level::DEBUG, attempts, code = err.code, error = %err, "configuration attempt failed");
            tr.on_error(err).await?;
        }
    }

    /// Re-reads the init marker until it yields an answer.
    async fn check_attempt_token(
        &self,
        tr: &mut dyn Transaction,
        token: &AttemptToken,
        started: Instant,
    ) -> Result<()> {
        let mut reads: u32 = 0;
        loop {
            reads += 1;
            match read_init_id(tr).await {
                Ok(Some(current)) if token.matches(&current) => return Ok(()),
                Ok(_) => {
                    event!(Level::WARN, "init marker holds another attempt's token");
                    return Err(AdminError::AlreadyInitialized);
                }
                Err(err) => {
                    self.ensure_can_retry(reads, started, &err)?;
                    event!(Level::DEBUG, reads, code = err.code, "init marker read failed");
                    tr.on_error(err).await?;
                }
            }
        }
    }

    fn ensure_can_retry(&self, attempts: u32, started: Instant, err: &StoreError) -> Result<()> {
        if err.is_retryable() && self.retry.is_exhausted(attempts, started.elapsed()) {
            event!(Level::ERROR, attempts, code = err.code, "configuration retry limit reached");
            return Err(AdminError::RetryLimitExceeded {
                attempts,
                last_error: err.clone(),
            });
        }
        Ok(())
    }
}

/// One attempt: set options, stage writes, commit. Returns the number of
/// keys written.
async fn apply_in_transaction(
    tr: &mut dyn Transaction,
    keys: &[KeyValue],
    token: Option<&AttemptToken>,
) -> StoreResult<usize> {
    tr.set_option(TransactionOption::AccessSystemKeys)?;
    tr.set_option(TransactionOption::LockAware)?;
    tr.set_option(TransactionOption::PrioritySystemImmediate)?;

    let mut writes = 0;
    match token {
        Some(token) => {
            tr.set_option(TransactionOption::InitializeNewDatabase)?;
            tr.add_read_conflict_key(INIT_ID_KEY)?;
            tr.set(INIT_ID_KEY, token.as_bytes());
            tr.set(INITIALIZED_KEY, b"1");
            writes += 2;
            for kv in keys {
                tr.set(&kv.key, &kv.value);
                writes += 1;
            }
        }
        None => {
            tr.set_option(TransactionOption::CausalWriteRisky)?;
            for kv in keys {
                let current = tr.get(&kv.key).await?;
                if current.as_deref() != Some(kv.value.as_slice()) {
                    tr.set(&kv.key, &kv.value);
                    writes += 1;
                }
            }
        }
    }

    tr.commit().await?;
    Ok(writes)
}

async fn read_init_id(tr: &mut dyn Transaction) -> StoreResult<Option<Vec<u8>>> {
    tr.set_option(TransactionOption::PrioritySystemImmediate)?;
    tr.set_option(TransactionOption::LockAware)?;
    tr.set_option(TransactionOption::ReadSystemKeys)?;
    tr.get(INIT_ID_KEY).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_tokens_are_unique_and_exact() {
        let a = AttemptToken::generate();
        let b = AttemptToken::generate();
        assert_ne!(a, b);
        assert!(a.matches(a.as_bytes()));
        assert!(!a.matches(b.as_bytes()));
        assert!(!a.matches(&a.as_bytes()[..15]));
    }
}
