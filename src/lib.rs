pub mod config;
pub mod core;
pub mod error;
pub mod export;
pub mod frame;
pub mod ingestion;
pub mod pipeline;
pub mod version;

pub use config::{BrandAliases, EngineConfig};
pub use error::{IntelError, Result};
pub use crate::core::models::{AggregateTable, Granularity, RawRow, RawValue, Record, RecordFilter, SnapshotPair};
