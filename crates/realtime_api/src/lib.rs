pub mod domain;
pub mod http;
mod realtime_api;

pub use realtime_api::*;
