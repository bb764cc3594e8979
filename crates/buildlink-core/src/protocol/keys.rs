//! Scoped keys and the build structure published by the server.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Name and value type of a setting or task.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct AttributeKey {
    /// Key name, e.g. `compile` or `name`.
    pub name: String,
    /// Server-side description of the value type, e.g. `java.lang.String`.
    #[serde(default)]
    pub manifest: String,
}

/// Where a key lives. Absent axes mean "this build / project / any".
#[derive(Clone, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(default)]
pub struct Scope {
    /// Build URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,
    /// Project name within the build.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    /// Configuration axis, e.g. `test`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
    /// Task axis, e.g. `console`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
}

/// Identifier for a watchable value or runnable task.
///
/// Equality and hashing are structural, so two keys decoded from different
/// frames compare equal when they name the same thing.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ScopedKey {
    /// The attribute.
    pub key: AttributeKey,
    /// Its scope.
    #[serde(default)]
    pub scope: Scope,
}

impl ScopedKey {
    /// Key with the given name and an empty scope.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            key: AttributeKey {
                name: name.into(),
                manifest: String::new(),
            },
            scope: Scope::default(),
        }
    }

    /// Set the project axis.
    #[must_use]
    pub fn in_project(mut self, project: impl Into<String>) -> Self {
        self.scope.project = Some(project.into());
        self
    }

    /// Set the configuration axis.
    #[must_use]
    pub fn in_config(mut self, config: impl Into<String>) -> Self {
        self.scope.config = Some(config.into());
        self
    }

    /// Set the value manifest.
    #[must_use]
    pub fn with_manifest(mut self, manifest: impl Into<String>) -> Self {
        self.key.manifest = manifest.into();
        self
    }

    /// Key name.
    pub fn name(&self) -> &str {
        &self.key.name
    }
}

impl fmt::Display for ScopedKey {
    /// Renders like the server's own key syntax: `project/config:task::name`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(build) = &self.scope.build {
            write!(f, "{{{build}}}")?;
        }
        if let Some(project) = &self.scope.project {
            write!(f, "{project}/")?;
        }
        if let Some(config) = &self.scope.config {
            write!(f, "{config}:")?;
        }
        if let Some(task) = &self.scope.task {
            write!(f, "{task}::")?;
        }
        f.write_str(&self.key.name)
    }
}

/// A project inside a build.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ProjectReference {
    /// Build URI.
    pub build: String,
    /// Project name.
    pub name: String,
}

/// The builds and projects the server currently has loaded.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildStructure {
    /// Build URIs.
    pub builds: Vec<String>,
    /// Projects across all builds.
    pub projects: Vec<ProjectReference>,
}
