use agent_layer_core::{
    Ownership, OwnershipReason, OwnershipState, OwnershipVerdict, UpgradeChange,
};
use tracing::trace;

use crate::baseline::{fingerprint_for_policy, BaselineEntry};

#[derive(Debug, Clone, Copy)]
pub struct ClassifyInput<'a> {
    pub path: &'a str,
    pub installed: Option<&'a [u8]>,
    pub baseline: Option<&'a BaselineEntry>,
}

/// Returns `None` for an addition candidate (nothing installed, nothing
/// recorded). First matching rule wins.
pub fn classify_ownership(input: ClassifyInput<'_>) -> Option<OwnershipVerdict> {
    let verdict = classify(input);
    if let Some(verdict) = &verdict {
        trace!(
            path = input.path,
            state = verdict.state.as_str(),
            "classified ownership"
        );
    }
    verdict
}

fn classify(input: ClassifyInput<'_>) -> Option<OwnershipVerdict> {
    let Some(installed) = input.installed else {
        return input.baseline.map(|_| {
            OwnershipVerdict::new(
                OwnershipState::ManagedButRemoved,
                Ownership::UpstreamTemplateDelta,
                OwnershipReason::InstalledFileMissing,
            )
        });
    };

    let Some(baseline) = input.baseline else {
        return Some(OwnershipVerdict::new(
            OwnershipState::UnknownNoBaseline,
            Ownership::UnknownNoBaseline,
            OwnershipReason::NoBaselineRecorded,
        ));
    };

    // Compared under the policy the baseline was recorded with.
    if fingerprint_for_policy(installed, baseline.policy) == baseline.fingerprint {
        Some(OwnershipVerdict::new(
            OwnershipState::Unmodified,
            Ownership::UpstreamTemplateDelta,
            OwnershipReason::ContentMatchesBaseline,
        ))
    } else {
        Some(OwnershipVerdict::new(
            OwnershipState::UserModified,
            Ownership::LocalCustomization,
            OwnershipReason::ContentDiffersFromBaseline,
        ))
    }
}

pub(crate) fn change_from_verdict(path: &str, verdict: OwnershipVerdict) -> UpgradeChange {
    UpgradeChange {
        path: path.to_string(),
        ownership: verdict.ownership,
        ownership_state: Some(verdict.state),
        ownership_reason_codes: verdict.reasons,
    }
}

pub(crate) fn addition(path: &str) -> UpgradeChange {
    UpgradeChange {
        path: path.to_string(),
        ownership: Ownership::UpstreamTemplateDelta,
        ownership_state: None,
        ownership_reason_codes: Vec::new(),
    }
}
