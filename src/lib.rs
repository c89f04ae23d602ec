//! meta-ads-mcp: local MCP server for the Meta Marketing (Graph) API
//!
//! Exposes ad account, campaign, ad set, ad, and insights operations as MCP
//! tools over stdio.
//!
//! # Authentication
//!
//! Two modes, resolved fresh on every tool call:
//!
//! - **Static token**: `META_ACCESS_TOKEN`
//! - **OAuth**: `meta-ads-mcp --login` runs a browser login and caches the
//!   resulting token; later tool calls read the cache
//!
//! A tool call never starts a login. Without a credential it fails with an
//! `AuthenticationRequired` result.
//!
//! # Modules
//!
//! - [`auth`]: Credential store, login flow, per-call guard
//! - [`graph`]: Request builder, HTTP client, pagination, sanitiser
//! - [`tools`]: Tool catalogue
//! - [`mcp`]: MCP protocol and stdio server
//! - [`config`]: Settings file and environment
//! - [`error`]: Error types

pub mod auth;
pub mod config;
pub mod error;
pub mod graph;
pub mod mcp;
pub mod tools;
