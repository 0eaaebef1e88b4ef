//! API handlers for the lending backend

mod health;
mod investment;
mod loan;

pub use health::{health_check, root, HealthResponse};
pub use investment::*;
pub use loan::*;
