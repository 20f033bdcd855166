//! # Controller
//!
//! Reconciliation primitives for node certificate secrets.
//!
//! - `nodecerts`: create-if-absent node and CA secrets
//! - `retry`: bounded fixed-interval retry
//! - `store`: secret persistence (Kubernetes API or in-memory)

pub mod nodecerts;
pub mod retry;
pub mod store;
