mod metrics;
mod persistence;
mod realtime_cache;
mod record;
mod result;

pub use metrics::*;
pub use persistence::*;
pub use realtime_cache::*;
pub use record::*;
pub use result::*;
