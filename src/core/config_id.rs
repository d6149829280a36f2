//! Configuration identification - WHICH configuration of WHICH project.
//!
//! A `ConfigId` is written `<project>/<configuration>` everywhere it is
//! user-visible: the manifest's `references`, the CLI and persisted state.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identity of one build configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConfigId {
    project: String,
    name: String,
}

impl ConfigId {
    pub fn new(project: impl Into<String>, name: impl Into<String>) -> Self {
        ConfigId {
            project: project.into(),
            name: name.into(),
        }
    }

    /// The owning project's name.
    pub fn project(&self) -> &str {
        &self.project
    }

    /// The configuration name within its project (e.g. "Debug").
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parse a reference as written in a manifest.
    ///
    /// A bare name refers to a configuration of `current_project`.
    pub fn parse_reference(reference: &str, current_project: &str) -> Result<Self, String> {
        if reference.contains('/') {
            reference.parse()
        } else if reference.is_empty() {
            Err("empty configuration reference".to_string())
        } else {
            Ok(ConfigId::new(current_project, reference))
        }
    }
}

impl fmt::Display for ConfigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project, self.name)
    }
}

impl FromStr for ConfigId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((project, name))
                if !project.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(ConfigId::new(project, name))
            }
            _ => Err(format!(
                "invalid configuration id `{}`; expected `<project>/<configuration>`",
                s
            )),
        }
    }
}

impl TryFrom<String> for ConfigId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ConfigId> for String {
    fn from(id: ConfigId) -> Self {
        id.to_string()
    }
}
