//! Graph API request pipeline.
//!
//! - [`request`] builds outbound requests from tool arguments
//! - [`client`] sends them, classifies failures, and retries reads
//! - [`paging`] handles cursors and date ranges
//! - [`sanitize`] redacts secrets before anything leaves the process

pub mod client;
pub mod paging;
pub mod request;
mod response;
pub mod retry;
pub mod sanitize;

pub use client::{GraphClient, GraphSettings};
pub use paging::{CursorLedger, PageCursor};
pub use request::{build_request, Endpoint, HttpMethod, PreparedRequest, ToolRequest};
pub use response::{ApiResponse, ResponseStatus};
