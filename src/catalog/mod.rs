//! Durable inverted-index catalog backed by a Fjall keyspace.

mod store;

pub use store::{AcuityReport, Catalog, CatalogStats, SourceInfo};
