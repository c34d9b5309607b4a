//! MCP wire surface.
//!
//! A line-delimited JSON-RPC 2.0 loop exposing the five primitives as
//! tools. The protocol layer is deliberately small: [`types`] defines
//! the request/response/error shapes, [`server`] dispatches the four
//! supported methods against the engine, and [`stdio`] runs the loop
//! over stdin/stdout.

pub mod server;
pub mod stdio;
pub mod types;

pub use server::McpServer;
pub use stdio::StdioTransport;
pub use types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION, MCP_VERSION};
