use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnershipState {
    Unmodified,
    UserModified,
    UnknownNoBaseline,
    Renamed,
    ManagedButRemoved,
}

impl OwnershipState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unmodified => "unmodified",
            Self::UserModified => "user_modified",
            Self::UnknownNoBaseline => "unknown_no_baseline",
            Self::Renamed => "renamed",
            Self::ManagedButRemoved => "managed_but_removed",
        }
    }
}

/// Who owns the difference between the installed file and the new template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ownership {
    UpstreamTemplateDelta,
    LocalCustomization,
    UnknownNoBaseline,
}

impl Ownership {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UpstreamTemplateDelta => "upstream_template_delta",
            Self::LocalCustomization => "local_customization",
            Self::UnknownNoBaseline => "unknown_no_baseline",
        }
    }

    /// Unknown provenance is handled exactly like a local edit when writing.
    pub fn requires_explicit_accept(self) -> bool {
        match self {
            Self::UpstreamTemplateDelta => false,
            Self::LocalCustomization | Self::UnknownNoBaseline => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnershipReason {
    ContentMatchesBaseline,
    ContentDiffersFromBaseline,
    NoBaselineRecorded,
    InstalledFileMissing,
    NotShippedByTemplates,
    ManagedMarkerMissing,
    RenameDetected,
}

impl OwnershipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ContentMatchesBaseline => "content_matches_baseline",
            Self::ContentDiffersFromBaseline => "content_differs_from_baseline",
            Self::NoBaselineRecorded => "no_baseline_recorded",
            Self::InstalledFileMissing => "installed_file_missing",
            Self::NotShippedByTemplates => "not_shipped_by_templates",
            Self::ManagedMarkerMissing => "managed_marker_missing",
            Self::RenameDetected => "rename_detected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipVerdict {
    pub state: OwnershipState,
    pub ownership: Ownership,
    pub reasons: Vec<OwnershipReason>,
}

impl OwnershipVerdict {
    pub fn new(state: OwnershipState, ownership: Ownership, reason: OwnershipReason) -> Self {
        Self {
            state,
            ownership,
            reasons: vec![reason],
        }
    }

    pub fn with_reason(mut self, reason: OwnershipReason) -> Self {
        if !self.reasons.contains(&reason) {
            self.reasons.push(reason);
        }
        self
    }
}
