//! Loans: model, funding state machine and lifecycle service

pub mod funding;
pub mod model;
pub mod service;

pub use funding::{advance, Advance, FundingError};
pub use model::*;
pub use service::LoanService;
