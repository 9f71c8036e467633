//! Parser for declarative node definition files.
//!
//! Node definitions arrive as YAML documents from the host orchestration
//! runtime. Parsing validates them for duplicates before any provider call
//! is made; validation failures are reported, never swallowed.

use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{ConfigError, GcpLifecycleError, Result};

use super::spec::NodeSet;

/// Parser for node definition documents.
#[derive(Debug, Default)]
pub struct ConfigParser;

impl ConfigParser {
    /// Creates a new parser.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Loads node definitions from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// definitions contain duplicate names.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<NodeSet> {
        let path = path.as_ref();
        info!("Loading node definitions from: {}", path.display());

        if !path.exists() {
            return Err(GcpLifecycleError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            GcpLifecycleError::Config(ConfigError::ParseError {
                message: format!("Failed to read {}: {e}", path.display()),
            })
        })?;

        self.parse_yaml(&content)
    }

    /// Parses node definitions from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid or names are duplicated.
    pub fn parse_yaml(&self, content: &str) -> Result<NodeSet> {
        debug!("Parsing node definitions");

        let nodes: NodeSet = serde_yaml::from_str(content).map_err(|e| {
            GcpLifecycleError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
            })
        })?;

        Self::check_duplicates(&nodes)?;

        debug!(
            "Parsed {} instance(s), {} project(s), {} binding(s)",
            nodes.instances.len(),
            nodes.projects.len(),
            nodes.bindings.len()
        );
        Ok(nodes)
    }

    /// Rejects duplicate resource names within a node set.
    fn check_duplicates(nodes: &NodeSet) -> Result<()> {
        let mut seen = HashSet::new();
        for instance in &nodes.instances {
            if !seen.insert(instance.name.as_str()) {
                return Err(GcpLifecycleError::Config(ConfigError::DuplicateName {
                    resource_type: String::from("instance"),
                    name: instance.name.clone(),
                }));
            }
        }

        let mut seen = HashSet::new();
        for project in &nodes.projects {
            if !seen.insert(project.id.as_str()) {
                return Err(GcpLifecycleError::Config(ConfigError::DuplicateName {
                    resource_type: String::from("project"),
                    name: project.id.clone(),
                }));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_node_set() {
        let yaml = r"
instances:
  - name: web-server
    image: projects/debian-cloud/global/images/family/debian-12
";
        let parser = ConfigParser::new();
        let nodes = parser.parse_yaml(yaml).expect("minimal definitions parse");
        assert_eq!(nodes.instances.len(), 1);
        assert_eq!(nodes.instances[0].name, "web-server");
        assert!(nodes.projects.is_empty());
    }

    #[test]
    fn parse_full_node_set() {
        let yaml = r##"
instances:
  - name: app
    machine_type: n1-standard-2
    zone: us-east1-b
    external_ip: true
    tags: [http-server]
    startup_script: "#!/bin/sh\necho hello"
    disks:
      - name: app-boot
        boot: true
        source: zones/us-east1-b/disks/app-boot
projects:
  - id: example-project
    name: Example
bindings:
  - resource: example-project
    bindings:
      - role: roles/viewer
        members: ["user:dev@example.com"]
discovery:
  zones: [us-east1-b, us-east1-c]
  resource_types: [projects.zones.clusters]
  blueprint_id: cluster-blueprint
"##;
        let parser = ConfigParser::new();
        let nodes = parser.parse_yaml(yaml).expect("full definitions parse");
        assert_eq!(nodes.instances.len(), 1);
        assert!(nodes.instances[0].external_ip);
        assert_eq!(nodes.instances[0].disks.len(), 1);
        assert!(nodes.instances[0].disks[0].boot);
        assert_eq!(nodes.bindings[0].bindings[0].role, "roles/viewer");
        let discovery = nodes.discovery.expect("discovery block parses");
        assert_eq!(discovery.zones.len(), 2);
    }

    #[test]
    fn load_file_reads_yaml_from_disk() {
        let dir = tempfile::tempdir().expect("temp dir creates");
        let path = dir.path().join("nodes.yaml");
        std::fs::write(&path, "instances:\n  - name: web\n    image: img\n")
            .expect("definition file writes");

        let nodes = ConfigParser::new().load_file(&path).expect("file loads");
        assert_eq!(nodes.instances[0].name, "web");
    }

    #[test]
    fn load_missing_file_is_file_not_found() {
        let err = ConfigParser::new()
            .load_file("/nonexistent/nodes.yaml")
            .expect_err("missing file is rejected");
        assert!(matches!(
            err,
            GcpLifecycleError::Config(ConfigError::FileNotFound { .. })
        ));
    }

    #[test]
    fn duplicate_instance_names_are_rejected() {
        let yaml = r"
instances:
  - name: web
    image: img-1
  - name: web
    image: img-2
";
        let parser = ConfigParser::new();
        let err = parser.parse_yaml(yaml).expect_err("duplicates are rejected");
        assert!(matches!(
            err,
            GcpLifecycleError::Config(ConfigError::DuplicateName { .. })
        ));
    }
}
