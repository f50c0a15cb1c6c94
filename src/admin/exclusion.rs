use crate::core::{KeyRange, KeyValue, Result, StoreResult};
use crate::transaction::{Database, Transaction, TransactionOption, transact};
use std::sync::Arc;
use tracing::{Instrument, Level, event, info_span};
use uuid::Uuid;

/// Conflict key bumped by every exclusion change.
pub const EXCLUDED_KEY: &[u8] = b"\xff/conf/excluded";
pub const EXCLUDED_PREFIX: &[u8] = b"\xff/conf/excluded/";

/// Entries fetched per range read when listing exclusions.
pub const EXCLUSION_PAGE_SIZE: usize = 10_000;

/// Key marking `address` as excluded.
pub fn exclusion_key(address: &str) -> Vec<u8> {
    let mut key = EXCLUDED_PREFIX.to_vec();
    key.extend_from_slice(address.as_bytes());
    key
}

/// Range covering every `address:<port>` entry under `address`.
pub fn exclusion_port_range(address: &str) -> StoreResult<KeyRange> {
    let mut prefix = exclusion_key(address);
    prefix.push(b':');
    KeyRange::prefix(&prefix)
}

/// Whether removing `address` is covered by the current exclusions: some
/// entry equals the address, or is a prefix of it followed by `:`. This is
/// the same set of entries `include` clears for that entry.
pub fn is_covered(address: &str, excluded: &[String]) -> bool {
    excluded.iter().any(|entry| {
        address
            .strip_prefix(entry.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(':'))
    })
}

/// Manages the process exclusion list in the system keyspace.
///
/// Every change rewrites [`EXCLUDED_KEY`] with a fresh random value after
/// declaring a read conflict on it, so concurrent changes to the list
/// conflict and serialize even when they touch different addresses.
pub struct ExclusionManager {
    database: Arc<dyn Database>,
    page_size: usize,
}

impl ExclusionManager {
    pub fn new(database: Arc<dyn Database>) -> Self {
        Self::with_page_size(database, EXCLUSION_PAGE_SIZE)
    }

    /// Lists exclusions `page_size` entries per range read.
    pub fn with_page_size(database: Arc<dyn Database>, page_size: usize) -> Self {
        Self {
            database,
            page_size: page_size.max(1),
        }
    }

    /// Marks each address as excluded.
    pub async fn exclude(&self, addresses: &[String]) -> Result<()> {
        let span = info_span!("coordinator.exclude", count = addresses.len());
        transact(self.database.as_ref(), |tr| {
            begin_exclusion_change(tr)?;
            for address in addresses {
                tr.set(&exclusion_key(address), b"");
            }
            Ok(())
        })
        .instrument(span.clone())
        .await?;
        span.in_scope(|| event!(Level::INFO, addresses = ?addresses, "processes excluded"));
        Ok(())
    }

    /// Removes each address, and every `address:<port>` entry under it,
    /// from the exclusion list.
    pub async fn include(&self, addresses: &[String]) -> Result<()> {
        let span = info_span!("coordinator.include", count = addresses.len());
        transact(self.database.as_ref(), |tr| {
            begin_exclusion_change(tr)?;
            for address in addresses {
                tr.clear(&exclusion_key(address));
                tr.clear_range(&exclusion_port_range(address)?);
            }
            Ok(())
        })
        .instrument(span.clone())
        .await?;
        span.in_scope(|| event!(Level::INFO, addresses = ?addresses, "processes included"));
        Ok(())
    }

    /// Addresses currently excluded, in key order.
    ///
    /// The whole list is read in one transaction, one page at a time.
    pub async fn excluded_addresses(&self) -> Result<Vec<String>> {
        let range = KeyRange::prefix(EXCLUDED_PREFIX)?;
        let mut tr = self.database.create_transaction()?;
        let entries = loop {
            match read_exclusions(tr.as_mut(), &range, self.page_size).await {
                Ok(entries) => break entries,
                Err(err) => tr.on_error(err).await?,
            }
        };
        Ok(entries
            .into_iter()
            .map(|kv| String::from_utf8_lossy(&kv.key[EXCLUDED_PREFIX.len()..]).into_owned())
            .collect())
    }

    /// The requested addresses whose removal is not yet covered by an
    /// exclusion.
    pub async fn unsafe_to_remove(&self, addresses: &[String]) -> Result<Vec<String>> {
        let excluded = self.excluded_addresses().await?;
        Ok(addresses
            .iter()
            .filter(|address| !is_covered(address, &excluded))
            .cloned()
            .collect())
    }
}

fn begin_exclusion_change(tr: &mut dyn Transaction) -> StoreResult<()> {
    tr.set_option(TransactionOption::PrioritySystemImmediate)?;
    tr.set_option(TransactionOption::AccessSystemKeys)?;
    tr.set_option(TransactionOption::LockAware)?;

    let epoch = Uuid::new_v4();
    tr.add_read_conflict_key(EXCLUDED_KEY)?;
    tr.set(EXCLUDED_KEY, epoch.as_bytes());
    Ok(())
}

async fn read_exclusions(
    tr: &mut dyn Transaction,
    range: &KeyRange,
    page_size: usize,
) -> StoreResult<Vec<KeyValue>> {
    tr.set_option(TransactionOption::ReadSystemKeys)?;
    tr.set_option(TransactionOption::LockAware)?;

    let mut entries = Vec::new();
    let mut page_range = range.clone();
    loop {
        let page = tr.get_range(&page_range, page_size).await?;
        let full = page.len() == page_size;
        let resume_after = page.last().map(|kv| kv.key.clone());
        entries.extend(page);
        match resume_after {
            Some(mut begin) if full => {
                // Smallest key strictly after the last one returned.
                begin.push(0x00);
                page_range = KeyRange::new(begin, range.end.clone())?;
            }
            _ => break,
        }
    }
    event!(Level::DEBUG, entries = entries.len(), "exclusion list read");
    Ok(entries)
}
