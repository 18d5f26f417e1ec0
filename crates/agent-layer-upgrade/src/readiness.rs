use std::collections::BTreeMap;

use agent_layer_core::ReadinessCheck;
use tracing::warn;

use crate::config_keys::lookup_key;
use crate::{FileSystem, RepoLayout};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReadinessCheckId {
    UnrecognizedConfigKeys,
    MissingRequiredConfigFields,
    UnresolvedConfigPlaceholders,
    ProcessEnvOverridesDotenv,
    IgnoredEmptyDotenvAssignments,
    VscodeNoSyncOutputsStale,
    FloatingExternalDependencySpecs,
    StaleDisabledAgentArtifacts,
}

impl ReadinessCheckId {
    pub const ALL: [Self; 8] = [
        Self::UnrecognizedConfigKeys,
        Self::MissingRequiredConfigFields,
        Self::UnresolvedConfigPlaceholders,
        Self::ProcessEnvOverridesDotenv,
        Self::IgnoredEmptyDotenvAssignments,
        Self::VscodeNoSyncOutputsStale,
        Self::FloatingExternalDependencySpecs,
        Self::StaleDisabledAgentArtifacts,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnrecognizedConfigKeys => "unrecognized_config_keys",
            Self::MissingRequiredConfigFields => "missing_required_config_fields",
            Self::UnresolvedConfigPlaceholders => "unresolved_config_placeholders",
            Self::ProcessEnvOverridesDotenv => "process_env_overrides_dotenv",
            Self::IgnoredEmptyDotenvAssignments => "ignored_empty_dotenv_assignments",
            Self::VscodeNoSyncOutputsStale => "vscode_no_sync_outputs_stale",
            Self::FloatingExternalDependencySpecs => "floating_external_dependency_specs",
            Self::StaleDisabledAgentArtifacts => "stale_disabled_agent_artifacts",
        }
    }

    pub fn summary(self) -> &'static str {
        match self {
            Self::UnrecognizedConfigKeys => "config.toml contains keys this release does not recognize",
            Self::MissingRequiredConfigFields => "config.toml is missing required fields",
            Self::UnresolvedConfigPlaceholders => {
                "config.toml references environment variables that have no value"
            }
            Self::ProcessEnvOverridesDotenv => {
                "process environment variables override different values in .agent-layer/.env"
            }
            Self::IgnoredEmptyDotenvAssignments => {
                ".agent-layer/.env contains empty assignments that are ignored"
            }
            Self::VscodeNoSyncOutputsStale => {
                "VS Code is disabled but previously generated VS Code outputs remain"
            }
            Self::FloatingExternalDependencySpecs => {
                "MCP servers launch external packages without a pinned version"
            }
            Self::StaleDisabledAgentArtifacts => "disabled agents still have generated files",
        }
    }

    pub fn recommended_action(self) -> &'static str {
        match self {
            Self::UnrecognizedConfigKeys => "remove or rename the listed keys",
            Self::MissingRequiredConfigFields => "add the listed fields to .agent-layer/config.toml",
            Self::UnresolvedConfigPlaceholders => {
                "set the variables in .agent-layer/.env or the process environment"
            }
            Self::ProcessEnvOverridesDotenv => {
                "unset the process variables or align .agent-layer/.env with them"
            }
            Self::IgnoredEmptyDotenvAssignments => "set a value or delete the listed lines",
            Self::VscodeNoSyncOutputsStale => {
                "delete the listed files or re-enable agents.vscode"
            }
            Self::FloatingExternalDependencySpecs => {
                "pin each package to an exact version in mcp.servers args"
            }
            Self::StaleDisabledAgentArtifacts => {
                "delete the listed files or re-enable the agents"
            }
        }
    }

    fn finding(self, details: Vec<String>) -> Option<ReadinessCheck> {
        if details.is_empty() {
            return None;
        }
        Some(ReadinessCheck {
            id: self.as_str().to_string(),
            summary: self.summary().to_string(),
            recommended_action: self.recommended_action().to_string(),
            details,
        })
    }
}

/// Source of process environment variables.
pub trait EnvSource {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Debug, Default, Clone)]
pub struct MapEnv(BTreeMap<String, String>);

impl MapEnv {
    pub fn from_pairs<K: Into<String>, V: Into<String>>(
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

impl EnvSource for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DotenvEntry {
    pub key: String,
    pub value: String,
    pub line: usize,
}

pub fn parse_dotenv(raw: &str) -> Vec<DotenvEntry> {
    let mut entries = Vec::new();
    for (index, line) in raw.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value)) = trimmed.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|inner| inner.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|inner| inner.strip_suffix('\''))
            })
            .unwrap_or(value);
        entries.push(DotenvEntry {
            key: key.to_string(),
            value: value.to_string(),
            line: index + 1,
        });
    }
    entries
}

pub struct ReadinessInputs<'a> {
    pub fs: &'a dyn FileSystem,
    pub layout: &'a RepoLayout,
    pub config: Option<&'a toml::Table>,
    pub env: &'a dyn EnvSource,
}

const AGENTS: &[&str] = &["gemini", "claude", "codex", "vscode", "antigravity"];
const AGENT_KEYS: &[&str] = &["enabled", "model", "reasoning_effort", "agent_specific"];
const MCP_SERVER_KEYS: &[&str] = &[
    "id",
    "enabled",
    "clients",
    "transport",
    "command",
    "args",
    "env",
    "url",
    "headers",
];
const WARNING_KEYS: &[&str] = &[
    "instruction_token_threshold",
    "mcp_server_threshold",
    "mcp_tools_total_threshold",
    "mcp_server_tools_threshold",
    "mcp_schema_tokens_total_threshold",
    "mcp_schema_tokens_server_threshold",
];
const REQUIRED_KEYS: &[&str] = &[
    "approvals.mode",
    "agents.gemini.enabled",
    "agents.claude.enabled",
    "agents.codex.enabled",
    "agents.vscode.enabled",
];
const AGENT_ARTIFACTS: &[(&str, &[&str])] = &[
    ("gemini", &["GEMINI.md", ".gemini/settings.json"]),
    ("claude", &["CLAUDE.md", ".mcp.json", ".claude/settings.json"]),
    ("codex", &[".codex/config.toml"]),
];
const VSCODE_MANAGED_BLOCK: &str = "// >>> agent-layer";

fn unknown_children(table: &toml::Table, prefix: &str, allowed: &[&str], out: &mut Vec<String>) {
    for key in table.keys() {
        if !allowed.contains(&key.as_str()) {
            out.push(format!("{prefix}.{key}"));
        }
    }
}

fn unrecognized_keys(config: &toml::Table) -> Vec<String> {
    let mut unknown = Vec::new();
    for (key, value) in config {
        match (key.as_str(), value) {
            ("approvals", toml::Value::Table(table)) => {
                unknown_children(table, "approvals", &["mode"], &mut unknown)
            }
            ("warnings", toml::Value::Table(table)) => {
                unknown_children(table, "warnings", WARNING_KEYS, &mut unknown)
            }
            ("agents", toml::Value::Table(agents)) => {
                for (agent, settings) in agents {
                    let prefix = format!("agents.{agent}");
                    match settings {
                        toml::Value::Table(settings) if AGENTS.contains(&agent.as_str()) => {
                            unknown_children(settings, &prefix, AGENT_KEYS, &mut unknown)
                        }
                        _ => unknown.push(prefix),
                    }
                }
            }
            ("mcp", toml::Value::Table(mcp)) => {
                unknown_children(mcp, "mcp", &["servers"], &mut unknown);
                let servers = mcp.get("servers").and_then(toml::Value::as_array);
                for (index, server) in servers.into_iter().flatten().enumerate() {
                    let prefix = format!("mcp.servers[{index}]");
                    match server.as_table() {
                        Some(server) => {
                            unknown_children(server, &prefix, MCP_SERVER_KEYS, &mut unknown)
                        }
                        None => unknown.push(prefix),
                    }
                }
            }
            _ => unknown.push(key.clone()),
        }
    }
    unknown
}

fn placeholders(value: &str) -> Vec<&str> {
    let mut found = Vec::new();
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        let name = &after[..end];
        if !name.is_empty()
            && name
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        {
            found.push(name);
        }
        rest = &after[end + 1..];
    }
    found
}

fn collect_strings<'a>(value: &'a toml::Value, path: String, out: &mut Vec<(String, &'a str)>) {
    match value {
        toml::Value::String(raw) => out.push((path, raw)),
        toml::Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                collect_strings(item, format!("{path}[{index}]"), out);
            }
        }
        toml::Value::Table(table) => {
            for (key, item) in table {
                collect_strings(item, format!("{path}.{key}"), out);
            }
        }
        _ => {}
    }
}

fn agent_enabled(config: &toml::Table, agent: &str) -> Option<bool> {
    lookup_key(config, &format!("agents.{agent}.enabled")).and_then(toml::Value::as_bool)
}

fn exists(fs: &dyn FileSystem, path: &str) -> bool {
    fs.exists(path).unwrap_or_else(|err| {
        warn!(path, error = %err, "readiness check could not read file");
        false
    })
}

fn is_unpinned_package(runner: &str, package: &str) -> bool {
    if package.ends_with("@latest") {
        return true;
    }
    match runner {
        "uvx" => !(package.contains("==") || package.contains('@')),
        _ => {
            let name = package.strip_prefix('@').unwrap_or(package);
            !name.contains('@')
        }
    }
}

fn floating_specs(config: &toml::Table) -> Vec<String> {
    let mut details = Vec::new();
    let servers = lookup_key(config, "mcp.servers").and_then(toml::Value::as_array);
    for (index, server) in servers.into_iter().flatten().enumerate() {
        let Some(server) = server.as_table() else {
            continue;
        };
        let id = server
            .get("id")
            .and_then(toml::Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("mcp.servers[{index}]"));
        let command = server.get("command").and_then(toml::Value::as_str).unwrap_or("");
        let args: Vec<&str> = server
            .get("args")
            .and_then(toml::Value::as_array)
            .map(|args| args.iter().filter_map(toml::Value::as_str).collect())
            .unwrap_or_default();

        let runner = command.rsplit('/').next().unwrap_or(command);
        let mut flagged = args
            .iter()
            .filter(|arg| arg.ends_with("@latest"))
            .map(|arg| arg.to_string())
            .collect::<Vec<_>>();
        if flagged.is_empty() && matches!(runner, "npx" | "bunx" | "uvx") {
            if let Some(package) = args.iter().find(|arg| !arg.starts_with('-')) {
                if is_unpinned_package(runner, package) {
                    flagged.push(package.to_string());
                }
            }
        }
        for package in flagged {
            details.push(format!("{id}: {package}"));
        }
    }
    details
}

/// Runs every advisory check. Inputs that cannot be read produce no finding.
pub fn run_readiness_checks(inputs: &ReadinessInputs<'_>) -> Vec<ReadinessCheck> {
    let dotenv_path = inputs.layout.dotenv_path();
    let dotenv = match inputs.fs.read(&dotenv_path) {
        Ok(raw) => raw
            .map(|raw| parse_dotenv(&String::from_utf8_lossy(&raw)))
            .unwrap_or_default(),
        Err(err) => {
            warn!(path = dotenv_path.as_str(), error = %err, "failed to read .env");
            Vec::new()
        }
    };
    let dotenv_value = |key: &str| {
        dotenv
            .iter()
            .rev()
            .find(|entry| entry.key == key)
            .map(|entry| entry.value.as_str())
    };

    let mut checks = Vec::new();
    for id in ReadinessCheckId::ALL {
        let details = match id {
            ReadinessCheckId::UnrecognizedConfigKeys => {
                inputs.config.map(unrecognized_keys).unwrap_or_default()
            }
            ReadinessCheckId::MissingRequiredConfigFields => REQUIRED_KEYS
                .iter()
                .filter(|key| {
                    inputs
                        .config
                        .is_none_or(|config| lookup_key(config, key).is_none())
                })
                .map(|key| key.to_string())
                .collect(),
            ReadinessCheckId::UnresolvedConfigPlaceholders => {
                let mut strings = Vec::new();
                if let Some(config) = inputs.config {
                    for (key, value) in config {
                        collect_strings(value, key.clone(), &mut strings);
                    }
                }
                let mut details = Vec::new();
                for (path, raw) in strings {
                    for name in placeholders(raw) {
                        let from_dotenv = dotenv_value(name).is_some_and(|value| !value.is_empty());
                        let from_env = inputs.env.var(name).is_some_and(|value| !value.is_empty());
                        if !from_dotenv && !from_env {
                            details.push(format!("{path}: ${{{name}}}"));
                        }
                    }
                }
                details
            }
            ReadinessCheckId::ProcessEnvOverridesDotenv => dotenv
                .iter()
                .filter(|entry| !entry.value.is_empty())
                .filter(|entry| {
                    inputs
                        .env
                        .var(&entry.key)
                        .is_some_and(|value| value != entry.value)
                })
                .map(|entry| entry.key.clone())
                .collect(),
            ReadinessCheckId::IgnoredEmptyDotenvAssignments => dotenv
                .iter()
                .filter(|entry| entry.value.is_empty())
                .map(|entry| format!("{} (line {})", entry.key, entry.line))
                .collect(),
            ReadinessCheckId::VscodeNoSyncOutputsStale => {
                let disabled = inputs
                    .config
                    .and_then(|config| agent_enabled(config, "vscode"))
                    == Some(false);
                if disabled {
                    stale_vscode_outputs(inputs.fs)
                } else {
                    Vec::new()
                }
            }
            ReadinessCheckId::FloatingExternalDependencySpecs => {
                inputs.config.map(floating_specs).unwrap_or_default()
            }
            ReadinessCheckId::StaleDisabledAgentArtifacts => {
                let mut details = Vec::new();
                if let Some(config) = inputs.config {
                    for (agent, artifacts) in AGENT_ARTIFACTS {
                        if agent_enabled(config, agent) != Some(false) {
                            continue;
                        }
                        for artifact in *artifacts {
                            if exists(inputs.fs, artifact) {
                                details.push(format!("{agent}: {artifact}"));
                            }
                        }
                    }
                }
                details
            }
        };
        checks.extend(id.finding(details));
    }
    checks
}

fn stale_vscode_outputs(fs: &dyn FileSystem) -> Vec<String> {
    let mut details = Vec::new();
    match fs.read(".vscode/settings.json") {
        Ok(Some(raw)) if String::from_utf8_lossy(&raw).contains(VSCODE_MANAGED_BLOCK) => {
            details.push(".vscode/settings.json".to_string())
        }
        Ok(_) => {}
        Err(err) => warn!(error = %err, "failed to read .vscode/settings.json"),
    }
    if exists(fs, ".vscode/mcp.json") {
        details.push(".vscode/mcp.json".to_string());
    }
    match fs.list_files(".vscode/prompts") {
        Ok(prompts) => details.extend(prompts),
        Err(err) => warn!(error = %err, "failed to list .vscode/prompts"),
    }
    details
}
