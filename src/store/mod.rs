//! Collaborator stores: settings document, trust cache and audit trail.

pub mod audit;
pub mod cache;
pub mod settings;
