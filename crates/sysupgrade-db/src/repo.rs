//! Repository traits and implementations.

pub mod catalog;

pub use catalog::{CatalogRepo, PgCatalogRepo, Profile, Release, TargetRecord};
