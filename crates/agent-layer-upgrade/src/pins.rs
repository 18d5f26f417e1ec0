use agent_layer_core::{PinAction, PinVersionChange};
use anyhow::{Context, Result};
use semver::Version;

use crate::{FileSystem, RepoLayout};

pub fn write_pin(fs: &dyn FileSystem, layout: &RepoLayout, version: &Version) -> Result<String> {
    let pin_path = layout.pin_path();
    fs.write(&pin_path, format!("{version}\n").as_bytes())
        .with_context(|| format!("failed to write pin: {pin_path}"))?;
    Ok(pin_path)
}

pub fn read_pin(fs: &dyn FileSystem, layout: &RepoLayout) -> Result<Option<String>> {
    let pin_path = layout.pin_path();
    let Some(raw) = fs
        .read(&pin_path)
        .with_context(|| format!("failed to read pin: {pin_path}"))?
    else {
        return Ok(None);
    };

    let value = String::from_utf8_lossy(&raw);
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    Ok(Some(trimmed.to_string()))
}

pub fn remove_pin(fs: &dyn FileSystem, layout: &RepoLayout) -> Result<bool> {
    let pin_path = layout.pin_path();
    fs.remove(&pin_path)
        .with_context(|| format!("failed to remove pin: {pin_path}"))
}

pub(crate) fn parse_pin_version(value: &str) -> Option<Version> {
    Version::parse(value.strip_prefix('v').unwrap_or(value)).ok()
}

/// A development target (no release version) drops an existing pin, since the
/// applied templates no longer correspond to any release.
pub fn plan_pin_version_change(current: Option<&str>, target: Option<&Version>) -> PinVersionChange {
    let action = match (current, target) {
        (None, None) => PinAction::None,
        (Some(_), None) => PinAction::Remove,
        (None, Some(_)) => PinAction::Add,
        (Some(current), Some(target)) => match parse_pin_version(current) {
            Some(current) if &current == target => PinAction::None,
            _ => PinAction::Update,
        },
    };

    PinVersionChange {
        current: current.map(str::to_string),
        target: target.map(Version::to_string),
        action,
    }
}
