mod handler_registry;
mod ingestion_worker_config;
mod message_handler;
mod sensor_registration_handler;
mod sensor_sharing_handler;
mod signal_phase_handler;
mod topic;
mod traffic_situation_handler;

pub use handler_registry::*;
pub use ingestion_worker_config::*;
pub use message_handler::*;
pub use sensor_registration_handler::*;
pub use sensor_sharing_handler::*;
pub use signal_phase_handler::*;
pub use topic::*;
pub use traffic_situation_handler::*;
