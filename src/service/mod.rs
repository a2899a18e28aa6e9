pub mod calculator;
pub mod fee;
pub mod invoicing;
pub mod partial;
pub mod registration;
pub mod sellers;

pub use calculator::calculate;
pub use fee::registration_fee;
pub use invoicing::{ConfirmedInvoice, InvoiceService, InvoiceSession, IssuanceBatch, SessionState};
pub use partial::{
    pending_prompts, resolve_partials, PartialDecider, PartialDecision, PartialPrompt, PartialResolution,
    PartialKey, PartialSelection, PresetDecider,
};
pub use registration::{parse_registered_list, pending_registrations, RegistrationTracker};
pub use sellers::{SellerDefaults, SellerDirectory};
