//! Loan lifecycle handlers (employee only)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::error::ApiError;
use crate::ledger::{page_bounds, Ledger, Page};
use crate::loan::{
    ApproveLoanRequest, CreateLoanRequest, DisburseLoanRequest, ListLoansQuery, Loan,
    LoanAgreement, LoanService, RejectLoanRequest,
};
use crate::middleware::EmployeeId;
use crate::models::ApiResponse;

pub async fn create_loan<L: Ledger>(
    State(service): State<Arc<LoanService<L>>>,
    EmployeeId(employee_id): EmployeeId,
    Json(request): Json<CreateLoanRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Loan>>), ApiError> {
    request.validate()?;

    let loan = service.create_loan(request).await?;
    tracing::debug!(%employee_id, loan_id = %loan.meta.id, "Loan created via API");

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(loan))))
}

pub async fn list_loans<L: Ledger>(
    State(service): State<Arc<LoanService<L>>>,
    _employee: EmployeeId,
    Query(query): Query<ListLoansQuery>,
) -> Result<Json<ApiResponse<Page<Loan>>>, ApiError> {
    let (page, limit) = page_bounds(query.page, query.limit);
    let loans = service.list_loans(query.filter(), page, limit).await?;

    Ok(Json(ApiResponse::ok(loans)))
}

pub async fn get_loan<L: Ledger>(
    State(service): State<Arc<LoanService<L>>>,
    _employee: EmployeeId,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Loan>>, ApiError> {
    let loan = service.get_loan(id).await?;

    Ok(Json(ApiResponse::ok(loan)))
}

pub async fn reject_loan<L: Ledger>(
    State(service): State<Arc<LoanService<L>>>,
    _employee: EmployeeId,
    Path(id): Path<Uuid>,
    Json(request): Json<RejectLoanRequest>,
) -> Result<Json<ApiResponse<Loan>>, ApiError> {
    request.validate()?;
    let loan = service.reject_loan(id, request.reject_reason).await?;

    Ok(Json(ApiResponse::ok(loan)))
}

pub async fn approve_loan<L: Ledger>(
    State(service): State<Arc<LoanService<L>>>,
    _employee: EmployeeId,
    Path(id): Path<Uuid>,
    Json(request): Json<ApproveLoanRequest>,
) -> Result<Json<ApiResponse<Loan>>, ApiError> {
    request.validate()?;
    let loan = service.approve_loan(id, request).await?;

    Ok(Json(ApiResponse::ok(loan)))
}

pub async fn disburse_loan<L: Ledger>(
    State(service): State<Arc<LoanService<L>>>,
    _employee: EmployeeId,
    Path(id): Path<Uuid>,
    Json(request): Json<DisburseLoanRequest>,
) -> Result<Json<ApiResponse<Loan>>, ApiError> {
    request.validate()?;
    let loan = service.disburse_loan(id, request).await?;

    Ok(Json(ApiResponse::ok(loan)))
}

pub async fn get_loan_agreement<L: Ledger>(
    State(service): State<Arc<LoanService<L>>>,
    Path(loan_id): Path<Uuid>,
) -> Result<Json<ApiResponse<LoanAgreement>>, ApiError> {
    let agreement = service.get_loan_agreement(loan_id).await?;

    Ok(Json(ApiResponse::ok(agreement)))
}
