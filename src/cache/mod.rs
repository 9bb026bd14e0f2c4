// Copyright 2025 Cowboy AI, LLC.

//! Derived caches over the authoritative store

mod blacklist;

pub use blacklist::{BlacklistCache, BlacklistCacheConfig, CacheStats};
