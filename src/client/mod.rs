//! Client layer: the interceptable transport and the licensing authority client.

pub mod http;
pub mod transport;
