// ============================================================================
// Store Transaction Port
// ============================================================================
//
// The coordinator talks to the key-value store only through these traits.
// The in-memory store in `storage::memory` implements them for tests and
// tooling; a production client binding implements the same contract.
//
// ============================================================================

pub mod options;
pub mod port;

pub use options::TransactionOption;
pub use port::{Database, Transaction, transact};
