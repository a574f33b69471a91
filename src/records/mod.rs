/// Documents identified by sequential identifiers

mod appointments;
mod invoices;

pub use appointments::{AppointmentRequestService, NewAppointmentRequest};
pub use invoices::{compute_totals, InvoiceService, InvoiceTotals, NewInvoice};
