//! Model Context Protocol server.
//!
//! ```text
//! stdin ──▶ transport ──▶ protocol ──▶ server ──▶ tools catalogue
//!                                        │
//!                                        ▼
//!                          auth guard ─▶ graph client ─▶ sanitiser
//!                                        │
//! stdout ◀── transport ◀─────────────────┘
//! ```
//!
//! Targets MCP protocol version 2024-11-05 over newline-delimited stdio.

pub mod protocol;
pub mod server;
pub mod transport;

pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_PROTOCOL_VERSION};
pub use server::McpServer;
pub use transport::{LineTransport, StdioTransport};
