//! Investment handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::error::ApiError;
use crate::investment::{
    CreateInvestmentRequest, FundingAgreement, Investment, InvestmentService,
    ListInvestmentsQuery,
};
use crate::ledger::{page_bounds, Ledger, Page};
use crate::middleware::{EmployeeId, InvestorId};
use crate::models::ApiResponse;

/// Book an investment for the calling investor
pub async fn place_investment<L: Ledger>(
    State(service): State<Arc<InvestmentService<L>>>,
    InvestorId(investor_id): InvestorId,
    Json(request): Json<CreateInvestmentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Investment>>), ApiError> {
    request.validate()?;

    let investment = service
        .place_investment(investor_id, request.loan_id, request.amount)
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(investment))))
}

pub async fn list_investments<L: Ledger>(
    State(service): State<Arc<InvestmentService<L>>>,
    _employee: EmployeeId,
    Query(query): Query<ListInvestmentsQuery>,
) -> Result<Json<ApiResponse<Page<Investment>>>, ApiError> {
    let (page, limit) = page_bounds(query.page, query.limit);
    let investments = service
        .list_investments_for_loan(query.loan_id, page, limit)
        .await?;

    Ok(Json(ApiResponse::ok(investments)))
}

pub async fn get_funding_agreement<L: Ledger>(
    State(service): State<Arc<InvestmentService<L>>>,
    Path(investment_id): Path<Uuid>,
) -> Result<Json<ApiResponse<FundingAgreement>>, ApiError> {
    let agreement = service.get_funding_agreement(investment_id).await?;

    Ok(Json(ApiResponse::ok(agreement)))
}
