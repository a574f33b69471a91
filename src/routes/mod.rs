mod appointments;
mod auth;
mod health_check;
mod invoices;
mod maintenance;

pub use appointments::request_appointment;
pub use auth::{change_password, create_staff, get_current_user, login, logout, refresh, register};
pub use health_check::health_check;
pub use invoices::{create_invoice, get_invoice};
pub use maintenance::cleanup_tokens;
