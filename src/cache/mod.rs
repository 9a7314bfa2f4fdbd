//! Push-driven cache invalidation.

mod adapter;

pub use adapter::{CacheInvalidationAdapter, CacheInvalidator, InvalidationStats, signals};
