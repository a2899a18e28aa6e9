pub mod memory;
pub mod pool;
pub mod queries;
pub mod store;

pub use memory::{CommitStep, MemoryInvoiceStore};
pub use pool::create_pool;
pub use store::{InvoiceCommit, InvoiceStore, PgInvoiceStore};
