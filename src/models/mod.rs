pub mod device;
pub mod month;
pub mod params;
pub mod record;
pub mod result;
pub mod seller;

pub use device::{parse_candidates, pivot_issuance_rows, DeviceIssuance, IssuanceRow, MonthIssuance};
pub use month::{month_range, Month};
pub use params::CommercialParameters;
pub use record::{InvoiceRecord, InvoiceRequest};
pub use result::InvoiceCalculationResult;
pub use seller::Seller;
