//! Exchange API boundary: gateway trait and REST adapter.

mod gateway;
mod rest;

pub use gateway::{ExchangeGateway, GatewayError};
pub use rest::RestGateway;
