//! Authority wire protocol: status model, response shapes and timestamps.

pub mod models;
pub mod shapes;
pub mod timestamps;
