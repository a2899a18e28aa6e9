pub mod api;
pub mod config;
pub mod db;
pub mod document;
pub mod error;
pub mod models;
pub mod service;

pub use config::AppConfig;
pub use db::{create_pool, InvoiceStore, MemoryInvoiceStore, PgInvoiceStore};
pub use document::{CsvDocumentSink, DocumentSink};
pub use error::InvoiceError;
pub use service::{InvoiceService, InvoiceSession, SessionState};
