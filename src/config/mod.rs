//! Declarative configuration: node definition types and parsing.

pub mod parser;
pub mod spec;

pub use parser::ConfigParser;
pub use spec::{
    DesiredBinding, DiscoveryProperties, DiskSpec, InstanceProperties, NodeSet, OsFamily,
    PolicyBindingProperties, ProjectProperties, ResolvedScript, ScriptKind, StartupScript,
    StartupScriptSpec, DEFAULT_MACHINE_TYPE, DEFAULT_SERVICE_SCOPES, DEFAULT_STARTUP_SCRIPT_KEY,
};
