//! hasconf - Hasura configuration tool
//!
//! Inspects a PostgreSQL schema (from a declarative model manifest or by
//! live introspection through Hasura itself) and generates the metadata
//! calls that track all available tables and foreign key relationships,
//! then applies them to the Hasura metadata API.

pub mod apply;
pub mod client;
pub mod config;
pub mod emit;
pub mod model;
pub mod resolve;
pub mod schema;
pub mod store;
