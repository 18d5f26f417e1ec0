use std::borrow::Cow;

/// Sentinel separating template-owned scaffolding from user-owned entries in
/// memory files. Everything after the marker line belongs to the user.
pub const ENTRIES_MARKER: &str = "<!-- ENTRIES START -->";

const VERSION_STAMP_PREFIX: &str = "<!-- agent-layer template v";
const VERSION_STAMP_SUFFIX: &str = "-->";

pub fn has_entries_marker(content: &str) -> bool {
    content.contains(ENTRIES_MARKER)
}

pub fn managed_region(content: &str) -> Option<&str> {
    let marker_at = content.find(ENTRIES_MARKER)?;
    let after_marker = marker_at + ENTRIES_MARKER.len();
    let end = content[after_marker..]
        .find('\n')
        .map(|offset| after_marker + offset + 1)
        .unwrap_or(content.len());
    Some(&content[..end])
}

fn user_region(content: &str) -> Option<&str> {
    managed_region(content).map(|region| &content[region.len()..])
}

/// Replaces the managed region of `installed` with the one from `template`.
/// When the installed file lost its marker, its whole content is kept after
/// the new marker so no user text is dropped.
pub fn merge_managed_section(template: &str, installed: &str) -> String {
    let Some(region) = managed_region(template) else {
        return template.to_string();
    };

    let mut merged = region.to_string();
    if !merged.ends_with('\n') {
        merged.push('\n');
    }
    match user_region(installed) {
        Some(rest) => merged.push_str(rest),
        None => merged.push_str(installed),
    }
    merged
}

pub fn version_stamp_line(version: &str) -> String {
    format!("{VERSION_STAMP_PREFIX}{version} {VERSION_STAMP_SUFFIX}")
}

fn is_version_stamp(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with(VERSION_STAMP_PREFIX) && trimmed.ends_with(VERSION_STAMP_SUFFIX)
}

pub fn strip_version_stamp(content: &str) -> Cow<'_, str> {
    if !content.lines().any(is_version_stamp) {
        return Cow::Borrowed(content);
    }

    let mut stripped = String::with_capacity(content.len());
    for line in content.split_inclusive('\n') {
        if is_version_stamp(line) {
            continue;
        }
        stripped.push_str(line);
    }
    Cow::Owned(stripped)
}
