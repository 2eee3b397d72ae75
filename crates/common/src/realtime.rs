mod field_map_cache;

pub use field_map_cache::*;
