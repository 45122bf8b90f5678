//! MCP (Model Context Protocol) envelope types for larkdocs.
//!
//! The relay serves MCP over a single HTTP endpoint. This crate holds the
//! wire types and the protocol-level error taxonomy; it performs no I/O.
//!
//! # Protocol flow
//!
//! ```text
//! POST /mcp  {"jsonrpc":"2.0","id":1,"method":"initialize",...}
//!            <- 200, Mcp-Session-Id: <id>
//! POST /mcp  {"jsonrpc":"2.0","method":"notifications/initialized"}
//!            Mcp-Session-Id: <id>  <- 202
//! POST /mcp  {"jsonrpc":"2.0","id":2,"method":"tools/list"}
//!            Mcp-Session-Id: <id>  <- 200
//! POST /mcp  {"jsonrpc":"2.0","id":3,"method":"tools/call","params":{...}}
//!            Mcp-Session-Id: <id>  <- 200
//! ```

pub mod error;
pub mod protocol;

pub use error::{EnvelopeError, ProtocolError, Result};
pub use protocol::{
    CallToolParams, CallToolResult, ClientInfo, InitializeParams, InitializeResult,
    JSONRPC_VERSION, JsonRpcError, JsonRpcRequest, JsonRpcResponse, ListToolsResult,
    MCP_PROTOCOL_VERSION, RequestId, SESSION_HEADER, SUPPORTED_PROTOCOL_VERSIONS,
    ServerCapabilities, ServerInfo, ToolContent, ToolInfo, ToolsCapability, parse_envelope,
};
