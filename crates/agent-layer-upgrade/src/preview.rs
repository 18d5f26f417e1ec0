use std::num::NonZeroUsize;

use agent_layer_core::DiffPreview;
use anyhow::{anyhow, Result};
use similar::TextDiff;

pub const DEFAULT_DIFF_LINES: usize = 40;

/// Maximum number of diff lines shown per file; always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffLineLimit(NonZeroUsize);

impl DiffLineLimit {
    pub fn new(lines: usize) -> Option<Self> {
        NonZeroUsize::new(lines).map(Self)
    }

    pub fn get(self) -> usize {
        self.0.get()
    }
}

impl Default for DiffLineLimit {
    fn default() -> Self {
        Self(NonZeroUsize::new(DEFAULT_DIFF_LINES).unwrap_or(NonZeroUsize::MIN))
    }
}

pub fn parse_diff_lines(raw: &str) -> Result<DiffLineLimit> {
    raw.trim()
        .parse::<usize>()
        .ok()
        .and_then(DiffLineLimit::new)
        .ok_or_else(|| {
            anyhow!("invalid value for --diff-lines: expected a positive integer, got '{raw}'")
        })
}

pub fn render_diff_preview(path: &str, old: &str, new: &str, limit: DiffLineLimit) -> DiffPreview {
    let diff = TextDiff::from_lines(old, new);
    let unified = diff
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{path}"), &format!("b/{path}"))
        .to_string();

    let total_lines = unified.lines().count();
    if total_lines <= limit.get() {
        return DiffPreview {
            path: path.to_string(),
            unified_diff: unified,
            truncated: false,
            total_lines,
        };
    }

    let mut shown = unified
        .lines()
        .take(limit.get())
        .collect::<Vec<_>>()
        .join("\n");
    shown.push_str(&format!(
        "\n... diff truncated: showing {} of {total_lines} lines; rerun with --diff-lines {total_lines} to see all of it\n",
        limit.get()
    ));
    DiffPreview {
        path: path.to_string(),
        unified_diff: shown,
        truncated: true,
        total_lines,
    }
}
