//! Storage traits and implementations.
//!
//! The `AggregateStore` trait defines the interface for aggregate view
//! storage, allowing different implementations (in-memory, document
//! database, etc.). Coordination between concurrent writers relies only on
//! version tokens.

pub mod aggregate_store;

pub use aggregate_store::{
    AggregateStore, AggregateStoreExt, DailyPage, InMemoryAggregateStore, PageCursor, StoreError,
    WriteCondition,
};
