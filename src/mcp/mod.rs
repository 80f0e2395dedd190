//! The tool and resource surface (§6). This module only translates between
//! [`Engine`](crate::engine::Engine) calls and the typed JSON shapes an
//! external transport would send and receive; the transport itself (a
//! JSON-RPC server, stdio framing, HTTP) is out of scope, per §1.

pub mod resources;
pub mod tool_types;
pub mod tools;

pub use resources::{entity_name_from_uri, render_context_resource, render_entity_resource};
pub use tools::{all_tools, find_tool, Tool};
