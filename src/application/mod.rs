//! Application layer orchestrating payees, payments and rail recommendations.
//!
//! `PaymentService` is the entry point. It owns the payee store, the payments
//! gateway and the `RecommendationLoop`, all injected at construction so that
//! nothing depends on process-global clients.

pub mod fee_estimator;
pub mod payees;
pub mod payments;
pub mod recommendation_loop;
pub mod resilience;
