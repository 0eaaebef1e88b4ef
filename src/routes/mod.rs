//! Route definitions for the lending API

mod investment;
mod loan;

use axum::{routing::get, Router};

use crate::handlers::{health_check, root};
use crate::ledger::Ledger;
use crate::middleware;
use crate::state::AppState;

pub use investment::investment_routes;
pub use loan::loan_routes;

/// The full application router with request tracing applied.
/// CORS is left to the binary.
pub fn app<L: Ledger>(state: AppState<L>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check::<L>))
        .merge(loan_routes::<L>())
        .merge(investment_routes::<L>())
        .with_state(state)
        .layer(axum::middleware::from_fn(middleware::request_tracing))
}
