//! Persistence collaborators.
//!
//! - [`MemoryStore`]: audit trail, account ledger and order ledger in memory
//! - [`FileAuditSink`]: append-only JSON-lines/CSV audit files in front of a store
//! - [`load_bars`]: CSV bar history for paper replay

mod csv_source;
mod file_audit;
mod memory;

pub use csv_source::load_bars;
pub use file_audit::FileAuditSink;
pub use memory::MemoryStore;
