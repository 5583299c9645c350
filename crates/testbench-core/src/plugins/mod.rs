//! Plugins shipped with the engine.

mod define;
mod shell;

pub use define::DefineFile;
pub use shell::ShellTool;

use crate::file::FileFormat;
use crate::registry::PluginCatalog;

pub const SHELL_TOOL_TYPE: &str = "shell";
pub const SHELL_TOOL_NAME: &str = "sh";
pub const DEFINE_FILE_TYPE: &str = "define";

/// Adds tool `shell/sh` and file `define` to `catalog`.
pub fn register_builtins(catalog: &mut PluginCatalog) -> &mut PluginCatalog {
    catalog
        .register_tool::<ShellTool>(SHELL_TOOL_TYPE, SHELL_TOOL_NAME)
        .register_file(DEFINE_FILE_TYPE, |spec| {
            Ok(Box::new(DefineFile::from_spec(spec)?) as Box<dyn FileFormat>)
        })
}
