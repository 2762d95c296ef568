//! dataiku-mcp: MCP server for AI-assisted Dataiku DSS project management
//!
//! This library exposes the objects of a Dataiku DSS instance (recipes,
//! datasets, scenarios, jobs, code environments, connections) as Model
//! Context Protocol tools and resources.
//!
//! # Architecture
//!
//! The server is a thin adapter. DSS owns every entity, so tools relay its
//! JSON and add summaries on top:
//!
//! - **Tools**: 43 operations grouped by object kind, each returning a
//!   JSON document with a `status` field
//! - **Resources**: the project list and per-project summaries
//! - **DSS client**: one authenticated HTTP client behind the [`dss::DssApi`]
//!   trait, replaceable in tests
//!
//! # Modules
//!
//! - [`config`]: Configuration loading and validation
//! - [`dss`]: DSS public API client
//! - [`error`]: Error types
//! - [`mcp`]: MCP protocol implementation
//! - [`resources`]: MCP resources
//! - [`tools`]: MCP tool handlers

pub mod config;
pub mod dss;
pub mod error;
pub mod mcp;
pub mod resources;
pub mod tools;
