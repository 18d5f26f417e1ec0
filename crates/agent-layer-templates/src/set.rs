use std::collections::BTreeMap;

use crate::paths::{file_category, FileCategory};

const EMBEDDED_TEMPLATES: &[(&str, &str)] = &[
    (".agent-layer/.gitignore", include_str!("../templates/gitignore")),
    (
        ".agent-layer/commands.allow",
        include_str!("../templates/commands.allow"),
    ),
    (
        ".agent-layer/instructions/00_base.md",
        include_str!("../templates/instructions/00_base.md"),
    ),
    (
        ".agent-layer/instructions/10_memory.md",
        include_str!("../templates/instructions/10_memory.md"),
    ),
    (
        ".agent-layer/instructions/20_tools.md",
        include_str!("../templates/instructions/20_tools.md"),
    ),
    (
        ".agent-layer/slash-commands/continue-roadmap.md",
        include_str!("../templates/slash-commands/continue-roadmap.md"),
    ),
    (
        ".agent-layer/slash-commands/find-issues.md",
        include_str!("../templates/slash-commands/find-issues.md"),
    ),
    (
        ".agent-layer/slash-commands/fix-issues.md",
        include_str!("../templates/slash-commands/fix-issues.md"),
    ),
    (
        "docs/agent-layer/BACKLOG.md",
        include_str!("../templates/memory/BACKLOG.md"),
    ),
    (
        "docs/agent-layer/COMMANDS.md",
        include_str!("../templates/memory/COMMANDS.md"),
    ),
    (
        "docs/agent-layer/DECISIONS.md",
        include_str!("../templates/memory/DECISIONS.md"),
    ),
    (
        "docs/agent-layer/ISSUES.md",
        include_str!("../templates/memory/ISSUES.md"),
    ),
    (
        "docs/agent-layer/ROADMAP.md",
        include_str!("../templates/memory/ROADMAP.md"),
    ),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Template<'a> {
    pub path: &'a str,
    pub content: &'a str,
}

impl Template<'_> {
    pub fn category(&self) -> FileCategory {
        file_category(self.path)
    }
}

/// The templates shipped by one binary, keyed by repository-relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateSet {
    entries: BTreeMap<String, String>,
}

impl TemplateSet {
    pub fn embedded() -> Self {
        Self::from_entries(
            EMBEDDED_TEMPLATES
                .iter()
                .map(|(path, content)| (path.to_string(), content.to_string())),
        )
    }

    pub fn from_entries<I, P, C>(entries: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(path, content)| (path.into(), content.into()))
                .collect(),
        }
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Templates in sorted path order.
    pub fn iter(&self) -> impl Iterator<Item = Template<'_>> {
        self.entries.iter().map(|(path, content)| Template {
            path: path.as_str(),
            content: content.as_str(),
        })
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
