//! Application layer containing the receipt processing orchestration.
//!
//! [`orchestrator::ReceiptProcessor`] is the entry point. It sequences the
//! quota ledger, the receipt registry, the recognition pipeline and the
//! transaction ledger for each request, threading per-request values through
//! the steps instead of keeping them on the service.

pub mod ledger;
pub mod orchestrator;
pub mod quota;
pub mod recognition;
pub mod registry;
