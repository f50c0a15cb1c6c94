pub mod error;
pub mod types;

pub use error::{AdminError, Result, StoreError, StoreErrorClass, StoreResult, codes};
pub use types::{KeyRange, KeyValue, printable};
