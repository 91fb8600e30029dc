//! Interface definitions for the search store.
//!
//! This module defines the abstract `SearchStoreProvider` trait that allows
//! for dependency injection and swappable store implementations.

mod search_store_provider;

pub use search_store_provider::SearchStoreProvider;
