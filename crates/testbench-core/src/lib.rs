pub mod config;
pub mod execution;
pub mod file;
pub mod models;
pub mod orchestration;
pub mod output;
pub mod plugins;
pub mod registry;
pub mod testbench;
pub mod tool;

pub use models::{CoreError, CoreErrorKind, CoreResult};
pub use registry::{PluginCatalog, PluginRegistry};
pub use testbench::{Testbench, TestbenchOptions};
