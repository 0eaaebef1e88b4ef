//! Loan route definitions

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::handlers::*;
use crate::ledger::Ledger;
use crate::state::AppState;

pub fn loan_routes<L: Ledger>() -> Router<AppState<L>> {
    Router::new()
        .route(
            "/api/v1/loan",
            post(create_loan::<L>).get(list_loans::<L>),
        )
        .route("/api/v1/loan/:id", get(get_loan::<L>))
        .route("/api/v1/loan/:id/reject", patch(reject_loan::<L>))
        .route("/api/v1/loan/:id/approve", patch(approve_loan::<L>))
        .route("/api/v1/loan/:id/disburse", patch(disburse_loan::<L>))
        .route(
            "/api/v1/loan/agreement/:loan_id",
            get(get_loan_agreement::<L>),
        )
}
