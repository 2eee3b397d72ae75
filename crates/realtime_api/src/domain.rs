mod traffic_situation_service;

pub use traffic_situation_service::*;
