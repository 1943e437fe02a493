// Re-export modules for testing and external use
pub mod shared {
    pub mod logging;
}

pub mod tfe {
    pub mod client;
    pub mod connection;

    // Re-export commonly used items
    pub use client::{Page, TfeClient, TfeError};
    pub use connection::{ConnectionError, ConnectionManager, SessionClients};
}

pub mod core {
    pub mod tfemcp;
}

pub mod mcp {
    pub mod error_handling;
    pub mod server;
    pub mod tools;
    pub mod transport;
    pub mod types;
}

pub mod config;

// Re-export commonly used types for easier testing and external use
pub use core::tfemcp::TfeMcp;
pub use mcp::server::TfeMcpServer;
pub use mcp::tools::registry::{
    CapabilityNotifier, CapabilityPredicate, DynamicToolRegistry, RegistryError,
};
pub use mcp::transport::{CallContext, SessionHandle, ToolDescriptor, ToolTable, ToolTransport};
