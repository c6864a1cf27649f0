//! AWS-backed adapters and the automation entry point.
//!
//! This crate owns SDK integration details (IAM and Lambda clients, error
//! classification, argument handling) and delegates every reconciliation
//! decision to `lambda_sync_core`.

pub mod adapters;
pub mod cli;
