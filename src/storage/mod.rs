//! SQLite persistence: connection setup, schema migrations, and the
//! write-retry helper shared by the memory store and the ledger.
//!
//! Grounded on subcog's `storage::sqlite` (connection/WAL/busy-timeout
//! setup) and `storage::resilience` (retry-with-backoff shape), adapted
//! to a single concrete backend since CRT has one persistence layer, not
//! a pluggable `PersistenceBackend`/`IndexBackend`/`VectorBackend` split.

pub mod connection;
pub mod global;
pub mod migrations;
pub mod profile_multi;
pub mod retry;

pub use connection::open_connection;
pub use global::GlobalStore;
pub use migrations::run_migrations;
pub use profile_multi::{ProfileFact, ProfileMultiStore, PROFILE_MEMORY_TRUST};
pub use retry::retry_with_backoff;
