pub mod catalog;
pub mod registry;
pub mod shim;

pub use catalog::{connection_status_tool, gated_tools};
pub use registry::{DynamicToolRegistry, ToolConstructor};
pub use shim::CapabilityShim;
