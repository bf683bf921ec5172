pub mod admin_cache;

pub use admin_cache::AdminCache;
