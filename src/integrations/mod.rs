//! Optional integrations with the host application's runtime.

pub mod scheduler;
