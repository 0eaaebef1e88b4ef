//! Middleware for the lending API
//!
//! Request tracing and caller identity extraction.

pub mod auth;
mod tracing;

pub use auth::{EmployeeId, InvestorId, EMPLOYEE_HEADER, INVESTOR_HEADER};
pub use tracing::{request_tracing, REQUEST_ID_HEADER};
