//! Lending backend library
//!
//! Investment booking and loan funding over a transactional ledger, with
//! post-commit notifications and an HTTP API.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod investment;
pub mod ledger;
pub mod loan;
pub mod middleware;
pub mod models;
pub mod notification;
pub mod routes;
pub mod state;
