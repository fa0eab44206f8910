//! MCP protocol: JSON-RPC 2.0 over stdio. This server speaks stdio only; the teacher's
//! Streamable-HTTP transport has no counterpart here.

pub mod messages;
pub mod stdio;
pub mod types;
