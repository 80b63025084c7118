//! Trust policy: grace evaluation and cache staleness.

pub mod gate;
pub mod grace;
