//! Investment route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::ledger::Ledger;
use crate::state::AppState;

pub fn investment_routes<L: Ledger>() -> Router<AppState<L>> {
    Router::new()
        .route(
            "/api/v1/investment",
            post(place_investment::<L>).get(list_investments::<L>),
        )
        .route(
            "/api/v1/investment/agreement/:investment_id",
            get(get_funding_agreement::<L>),
        )
}
