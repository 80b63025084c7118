//! Egress guard: license policy on every outbound HTTP call in the process.

pub mod egress;

pub use egress::{EgressGuard, EgressPolicy, GuardedTransport, Revalidate};
