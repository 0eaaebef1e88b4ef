//! HTTP surface tests against the in-memory ledger

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

use lendbook_server::investment::InvestmentService;
use lendbook_server::ledger::{Ledger, MemoryLedger};
use lendbook_server::loan::{Loan, LoanService, LoanState};
use lendbook_server::middleware::{EMPLOYEE_HEADER, INVESTOR_HEADER, REQUEST_ID_HEADER};
use lendbook_server::models::{Borrower, Employee, Investor};
use lendbook_server::notification::NotificationBus;
use lendbook_server::routes;
use lendbook_server::state::AppState;

struct TestApp {
    router: Router,
    ledger: Arc<MemoryLedger>,
    borrower: Borrower,
    employee: Employee,
}

async fn setup() -> TestApp {
    let ledger = Arc::new(MemoryLedger::new());
    let bus = NotificationBus::new(16);
    let loan_service = Arc::new(LoanService::new(ledger.clone()));
    let investment_service = Arc::new(InvestmentService::new(
        ledger.clone(),
        bus,
        Duration::from_secs(5),
    ));
    let state = AppState::new(ledger.clone(), loan_service, investment_service);

    let borrower = ledger
        .create(Borrower::new("Budi Santoso", "budi@example.com"))
        .await
        .unwrap();
    let employee = ledger
        .create(Employee::new("Sari", "sari@example.com"))
        .await
        .unwrap();

    TestApp {
        router: routes::app(state),
        ledger,
        borrower,
        employee,
    }
}

async fn approved_loan(ledger: &MemoryLedger, borrower_id: Uuid) -> Loan {
    let mut loan = Loan::new(
        borrower_id,
        dec!(2000),
        dec!(0.12),
        dec!(0.10),
        "https://docs.example.com/letter.pdf",
    );
    loan.state = LoanState::Approved;
    ledger.create(loan).await.unwrap()
}

async fn send(
    router: &Router,
    method: &str,
    uri: &str,
    headers: &[(&str, String)],
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, value.as_str());
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

    (status, json)
}

#[tokio::test]
async fn test_root_and_health() {
    let app = setup().await;

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));

    let (status, body) = send(&app.router, "GET", "/health", &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let app = setup().await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header(REQUEST_ID_HEADER, "req-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.headers()[REQUEST_ID_HEADER], "req-123");
}

#[tokio::test]
async fn test_role_headers_are_required() {
    let app = setup().await;
    let loan = approved_loan(&app.ledger, app.borrower.meta.id).await;
    let body = json!({ "loan_id": loan.meta.id, "amount": "100" });

    let (status, response) =
        send(&app.router, "POST", "/api/v1/investment", &[], Some(body.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(response["error"]["code"], "FORBIDDEN");
    assert_eq!(response["error"]["message"], "missing required role header");

    let (status, response) = send(
        &app.router,
        "POST",
        "/api/v1/investment",
        &[(INVESTOR_HEADER, "not-a-uuid".to_string())],
        Some(body.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(response["error"]["message"], "invalid x-investor-id header");

    // An employee id does not stand in for an investor
    let (status, _) = send(
        &app.router,
        "POST",
        "/api/v1/investment",
        &[(EMPLOYEE_HEADER, app.employee.meta.id.to_string())],
        Some(body),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app.router, "GET", "/api/v1/loan", &[], None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_place_investment() {
    let app = setup().await;
    let loan = approved_loan(&app.ledger, app.borrower.meta.id).await;
    let investor = app
        .ledger
        .create(Investor::new("Ada", "ada@example.com", dec!(5000)))
        .await
        .unwrap();
    let caller = [(INVESTOR_HEADER, investor.meta.id.to_string())];

    let (status, body) = send(
        &app.router,
        "POST",
        "/api/v1/investment",
        &caller,
        Some(json!({ "loan_id": loan.meta.id, "amount": "1000" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["amount"], "1000");
    assert_eq!(body["data"]["investor_id"], investor.meta.id.to_string());

    let investment_id = body["data"]["id"].as_str().unwrap().to_string();
    let (status, body) = send(
        &app.router,
        "GET",
        &format!("/api/v1/investment/agreement/{}", investment_id),
        &[],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["investor_name"], "Ada");
    assert_eq!(body["data"]["borrower_name"], "Budi Santoso");

    let (status, body) = send(
        &app.router,
        "GET",
        &format!("/api/v1/investment?loan_id={}", loan.meta.id),
        &[(EMPLOYEE_HEADER, app.employee.meta.id.to_string())],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["has_next"], false);
}

#[tokio::test]
async fn test_investment_rejections() {
    let app = setup().await;
    let loan = approved_loan(&app.ledger, app.borrower.meta.id).await;
    let investor = app
        .ledger
        .create(Investor::new("Ada", "ada@example.com", dec!(500)))
        .await
        .unwrap();
    let caller = [(INVESTOR_HEADER, investor.meta.id.to_string())];

    let (status, body) = send(
        &app.router,
        "POST",
        "/api/v1/investment",
        &caller,
        Some(json!({ "loan_id": loan.meta.id, "amount": "0" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, body) = send(
        &app.router,
        "POST",
        "/api/v1/investment",
        &caller,
        Some(json!({ "loan_id": loan.meta.id, "amount": "0.001" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, body) = send(
        &app.router,
        "POST",
        "/api/v1/investment",
        &caller,
        Some(json!({ "loan_id": loan.meta.id, "amount": "1000" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "insufficient balance");

    let (status, body) = send(
        &app.router,
        "POST",
        "/api/v1/investment",
        &caller,
        Some(json!({ "loan_id": Uuid::new_v4(), "amount": "100" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "loan not found");
}

#[tokio::test]
async fn test_loan_lifecycle_over_http() {
    let app = setup().await;
    let caller = [(EMPLOYEE_HEADER, app.employee.meta.id.to_string())];

    let (status, body) = send(
        &app.router,
        "POST",
        "/api/v1/loan",
        &caller,
        Some(json!({
            "borrower_id": app.borrower.meta.id,
            "principal_amount": "2000",
            "rate": "0.12",
            "roi": "0.10",
            "agreement_letter_url": "https://docs.example.com/letter.pdf",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["state"], "proposed");
    let loan_id = body["data"]["id"].as_str().unwrap().to_string();

    // No agreement before funding
    let (status, _) = send(
        &app.router,
        "GET",
        &format!("/api/v1/loan/agreement/{}", loan_id),
        &[],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &app.router,
        "PATCH",
        &format!("/api/v1/loan/{}/approve", loan_id),
        &caller,
        Some(json!({
            "validator_employee_id": app.employee.meta.id,
            "visit_proof_picture_url": "https://img.example.com/visit.jpg",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["state"], "approved");

    let (status, body) = send(
        &app.router,
        "PATCH",
        &format!("/api/v1/loan/{}/reject", loan_id),
        &caller,
        Some(json!({ "reject_reason": "too late" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "loan is not in proposed state");

    let (status, body) = send(
        &app.router,
        "GET",
        "/api/v1/loan?state=approved",
        &caller,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["data"][0]["id"], loan_id);
}

#[tokio::test]
async fn test_unknown_loan_is_not_found() {
    let app = setup().await;

    let (status, body) = send(
        &app.router,
        "GET",
        &format!("/api/v1/loan/{}", Uuid::new_v4()),
        &[(EMPLOYEE_HEADER, app.employee.meta.id.to_string())],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert_eq!(body["error"]["message"], "loan not found");
}
