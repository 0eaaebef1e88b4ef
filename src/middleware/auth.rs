//! Caller identity extraction
//!
//! Employees and investors identify themselves with an id header. A route
//! is restricted to a role by taking that role's extractor.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
};
use uuid::Uuid;

use crate::error::ApiError;

pub const EMPLOYEE_HEADER: &str = "x-employee-id";
pub const INVESTOR_HEADER: &str = "x-investor-id";

/// Calling employee
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmployeeId(pub Uuid);

/// Calling investor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvestorId(pub Uuid);

fn id_from_header(parts: &Parts, header: &'static str) -> Result<Uuid, ApiError> {
    let value = parts
        .headers
        .get(header)
        .ok_or_else(|| ApiError::Forbidden("missing required role header".to_string()))?;

    value
        .to_str()
        .ok()
        .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
        .ok_or_else(|| ApiError::Forbidden(format!("invalid {} header", header)))
}

#[async_trait]
impl<S> FromRequestParts<S> for EmployeeId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        id_from_header(parts, EMPLOYEE_HEADER).map(EmployeeId)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for InvestorId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        id_from_header(parts, INVESTOR_HEADER).map(InvestorId)
    }
}
