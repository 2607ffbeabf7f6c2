pub mod registry;
pub mod runner;
pub mod spec;
pub mod traits;

pub use registry::{RegistryError, ToolRegistry};
pub use runner::{RunnerParams, ToolRunner};
pub use spec::ToolSpec;
pub use traits::{fail, succeed, tool_fn, FnTool, ToolBodyContext, ToolFn};
