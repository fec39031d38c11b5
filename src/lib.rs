//! Mapkeeper: reset and backup for a game-map points-of-interest database.
//!
//! The database holds two map partitions, `deep_desert` (with its A1..I9 grid of
//! squares) and `hagga_basin`. POIs, comments, uploaded images and the links
//! between them reference each other through foreign keys with no cascade, so
//! wiping a partition means deleting leaves first and cleaning up the files the
//! rows point to.
//!
//! # Modules
//!
//! - [`config`]: configuration from TOML and environment variables
//! - [`db`]: SQLite schema, migrations and health checks
//! - [`store`]: the [`store::DataStore`] capability and its SQLite implementation
//! - [`blob`]: the [`blob::BlobStore`] capability with local and HTTP backends
//! - [`reset`]: confirmation gate, discovery and the three-phase reset
//! - [`backup`]: timestamped backups with pruning
//! - [`inventory`]: per-scope row counts
//! - [`server`]: the HTTP API

pub mod backup;
pub mod blob;
pub mod cli;
pub mod config;
pub mod db;
pub mod inventory;
pub mod reset;
pub mod server;
pub mod store;
