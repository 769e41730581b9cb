//! Deadwood Core: symbol/file tracking and the selective unload engine

pub mod config;
pub mod dependency;
pub mod error;
pub mod files;
pub mod graph;
pub mod model;
pub mod path;
pub mod report;
pub mod runtime;
pub mod symbols;
pub mod tracker;


#[cfg(test)]
pub mod test_utils;

pub use config::{Config, WatchMode, CONFIG_FILE};
pub use dependency::DependencyGraph;
pub use error::{Error, HostError, Result};
pub use files::{FileRecord, FileRegistry};
pub use graph::ModuleCache;
pub use model::{EntityId, EntityInfo, EntityKind, Relation};
pub use report::UnloadReport;
pub use runtime::{MemoryRuntime, RemovalListener, Runtime};
pub use symbols::SymbolIndex;
pub use tracker::Tracker;
