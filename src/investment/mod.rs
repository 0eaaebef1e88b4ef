//! Investments: model and booking service

pub mod model;
pub mod service;

pub use model::*;
pub use service::{BookingError, InvestmentService, LOCK_ORDER};
