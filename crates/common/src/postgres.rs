mod client;
mod config;
mod persistence_gateway;

pub use client::*;
pub use config::*;
pub use persistence_gateway::*;
