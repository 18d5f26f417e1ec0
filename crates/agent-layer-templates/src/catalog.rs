use std::collections::BTreeSet;

use agent_layer_core::MigrationKind;
use anyhow::{anyhow, Context, Result};
use semver::Version;
use serde::Deserialize;

const MANIFEST_SCHEMA_VERSION: u32 = 1;

const EMBEDDED_MANIFESTS: &[(&str, &str)] = &[
    ("0.6.0.json", include_str!("../migrations/0.6.0.json")),
    ("0.7.0.json", include_str!("../migrations/0.7.0.json")),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Bool,
    String,
    Integer,
    StringList,
}

impl ValueType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::String => "string",
            Self::Integer => "integer",
            Self::StringList => "string_list",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationOperation {
    pub id: String,
    pub kind: MigrationKind,
    pub rationale: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub to_type: Option<ValueType>,
}

impl MigrationOperation {
    fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(anyhow!("migration operation id must not be empty"));
        }
        let require = |field: &str, present: bool| -> Result<()> {
            if present {
                Ok(())
            } else {
                Err(anyhow!(
                    "migration '{}' ({}) is missing required field '{field}'",
                    self.id,
                    self.kind.as_str()
                ))
            }
        };

        match self.kind {
            MigrationKind::RenameFile | MigrationKind::ConfigRenameKey => {
                require("from", self.from.is_some())?;
                require("to", self.to.is_some())?;
            }
            MigrationKind::DeleteFile | MigrationKind::DeleteGeneratedArtifact => {
                require("from", self.from.is_some())?;
            }
            MigrationKind::ConfigSetDefault => {
                require("key", self.key.is_some())?;
                require("value", self.value.is_some())?;
            }
            MigrationKind::ConfigRetypeKey => {
                require("key", self.key.is_some())?;
                require("to_type", self.to_type.is_some())?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationManifest {
    pub schema_version: u32,
    pub target_version: Version,
    #[serde(default)]
    pub operations: Vec<MigrationOperation>,
}

/// Versioned migration manifests in ascending release order. Operations keep
/// the order they were declared in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationCatalog {
    manifests: Vec<MigrationManifest>,
}

impl MigrationCatalog {
    pub fn embedded() -> Result<Self> {
        let manifests = EMBEDDED_MANIFESTS
            .iter()
            .map(|(name, raw)| {
                Self::parse_manifest(raw)
                    .with_context(|| format!("failed parsing embedded migration manifest {name}"))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::from_manifests(manifests)
    }

    pub fn parse_manifest(raw: &str) -> Result<MigrationManifest> {
        serde_json::from_str(raw).context("invalid migration manifest JSON")
    }

    pub fn from_manifests(mut manifests: Vec<MigrationManifest>) -> Result<Self> {
        let mut versions = BTreeSet::new();
        let mut ids = BTreeSet::new();
        for manifest in &manifests {
            if manifest.schema_version != MANIFEST_SCHEMA_VERSION {
                return Err(anyhow!(
                    "unsupported migration manifest schema_version {} for {}",
                    manifest.schema_version,
                    manifest.target_version
                ));
            }
            if !versions.insert(manifest.target_version.clone()) {
                return Err(anyhow!(
                    "duplicate migration manifest for version {}",
                    manifest.target_version
                ));
            }
            for operation in &manifest.operations {
                operation.validate()?;
                if !ids.insert(operation.id.clone()) {
                    return Err(anyhow!("duplicate migration id '{}'", operation.id));
                }
            }
        }

        manifests.sort_by(|left, right| left.target_version.cmp(&right.target_version));
        Ok(Self { manifests })
    }

    pub fn manifests(&self) -> &[MigrationManifest] {
        &self.manifests
    }
}
