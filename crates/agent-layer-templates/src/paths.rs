pub const AGENT_LAYER_DIR: &str = ".agent-layer";
pub const MEMORY_DIR: &str = "docs/agent-layer";

/// Directories whose whole content is owned by the template system. Files found
/// here that no template ships are reported as orphans.
pub const MANAGED_DIRS: &[&str] = &[
    ".agent-layer/instructions",
    ".agent-layer/slash-commands",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileCategory {
    Managed,
    Memory,
}

impl FileCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Managed => "managed",
            Self::Memory => "memory",
        }
    }
}

pub fn file_category(path: &str) -> FileCategory {
    match path.strip_prefix(MEMORY_DIR) {
        Some(rest) if rest.starts_with('/') => FileCategory::Memory,
        _ => FileCategory::Managed,
    }
}

pub fn is_in_managed_dir(path: &str) -> bool {
    MANAGED_DIRS.iter().any(|dir| {
        path.strip_prefix(dir)
            .is_some_and(|rest| rest.starts_with('/') && rest.len() > 1)
    })
}

/// Two paths share a purpose when they live in the same directory and belong
/// to the same category; renames are only proposed within one purpose.
pub fn managed_purpose(path: &str) -> (FileCategory, &str) {
    let parent = path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("");
    (file_category(path), parent)
}
