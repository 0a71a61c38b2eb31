//! Document storage: the single point of mutation for lifecycle state.
//!
//! [`MemoryStore`] backs tests and ephemeral runs; [`DuckStore`] (feature
//! `duckdb`) persists to a DuckDB file and runs every operation in one
//! transaction.

mod error;
mod memory;
mod store;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use store::{DocumentStore, Settlement, StoreResult};

#[cfg(feature = "duckdb")]
mod duck;
#[cfg(feature = "duckdb")]
pub use duck::{DuckStore, LedgerReport};
