use std::fmt;

/// Per-transaction flags understood by the store.
///
/// Options are cleared whenever a transaction is reset, including the reset
/// performed by a successful `on_error`, so callers set them again at the
/// top of every attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransactionOption {
    /// Allows reads from the system keyspace.
    ReadSystemKeys,

    /// Allows reads and writes in the system keyspace.
    AccessSystemKeys,

    /// Proceed even when the database has been locked by an administrator.
    LockAware,

    /// Highest scheduling priority; bypasses ratekeeping.
    PrioritySystemImmediate,

    /// This transaction is the first write to an empty database.
    InitializeNewDatabase,

    /// Reduced durability: the commit may become visible out of causal order.
    CausalWriteRisky,
}

impl TransactionOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionOption::ReadSystemKeys => "read_system_keys",
            TransactionOption::AccessSystemKeys => "access_system_keys",
            TransactionOption::LockAware => "lock_aware",
            TransactionOption::PrioritySystemImmediate => "priority_system_immediate",
            TransactionOption::InitializeNewDatabase => "initialize_new_database",
            TransactionOption::CausalWriteRisky => "causal_write_risky",
        }
    }
}

impl fmt::Display for TransactionOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
