use std::collections::{BTreeMap, BTreeSet};

use agent_layer_core::{
    has_entries_marker, normalize_line_endings, strip_version_stamp, OwnershipReason,
    OwnershipState, RenameConfidence, RenameDetection, UpgradeChange, UpgradeRename,
};
use agent_layer_templates::{managed_purpose, TemplateSet};
use tracing::debug;

use crate::diff_planner::InstalledTree;

/// Minimum Dice line overlap for a `structural-similarity` rename.
pub const MEDIUM_SIMILARITY_THRESHOLD: f64 = 0.80;

fn comparable(content: &[u8]) -> String {
    let normalized = normalize_line_endings(content);
    let text = String::from_utf8_lossy(&normalized);
    strip_version_stamp(&text).into_owned()
}

fn line_counts(content: &str) -> BTreeMap<&str, usize> {
    let mut counts = BTreeMap::new();
    for line in content.lines().map(str::trim).filter(|line| !line.is_empty()) {
        *counts.entry(line).or_insert(0) += 1;
    }
    counts
}

/// Dice coefficient over the multisets of trimmed non-blank lines.
pub fn line_overlap(left: &str, right: &str) -> f64 {
    let left = line_counts(left);
    let right = line_counts(right);
    let total: usize = left.values().sum::<usize>() + right.values().sum::<usize>();
    if total == 0 {
        return 0.0;
    }
    let shared: usize = left
        .iter()
        .filter_map(|(line, count)| right.get(line).map(|other| (*count).min(*other)))
        .sum();
    (2 * shared) as f64 / total as f64
}

struct Candidate<'a> {
    orphan: &'a UpgradeChange,
    to: &'a str,
    confidence: RenameConfidence,
    detection: RenameDetection,
    score: f64,
}

fn score_pair(from: &str, to: &str) -> Option<(RenameConfidence, RenameDetection, f64)> {
    if from.trim().is_empty() || to.trim().is_empty() {
        return None;
    }
    if from == to {
        return Some((
            RenameConfidence::High,
            RenameDetection::ExactContentMatch,
            1.0,
        ));
    }
    if has_entries_marker(from) != has_entries_marker(to) {
        return None;
    }
    let score = line_overlap(from, to);
    (score >= MEDIUM_SIMILARITY_THRESHOLD).then_some((
        RenameConfidence::Medium,
        RenameDetection::StructuralSimilarity,
        score,
    ))
}

/// Pairs installed orphans with additions. Assignment is greedy and
/// one-to-one in (confidence, score, from, to) order.
pub fn detect_renames(
    orphans: &[UpgradeChange],
    additions: &[UpgradeChange],
    templates: &TemplateSet,
    installed: &InstalledTree,
) -> Vec<UpgradeRename> {
    let mut candidates = Vec::new();
    for orphan in orphans {
        if !orphan
            .ownership_reason_codes
            .contains(&OwnershipReason::NotShippedByTemplates)
        {
            continue;
        }
        let Some(from_content) = installed.get(&orphan.path) else {
            continue;
        };
        let from_content = comparable(from_content);

        for added in additions {
            if managed_purpose(&orphan.path) != managed_purpose(&added.path) {
                continue;
            }
            let Some(to_content) = templates.get(&added.path) else {
                continue;
            };
            let to_content = comparable(to_content.as_bytes());
            if let Some((confidence, detection, score)) = score_pair(&from_content, &to_content) {
                candidates.push(Candidate {
                    orphan,
                    to: &added.path,
                    confidence,
                    detection,
                    score,
                });
            }
        }
    }

    candidates.sort_by(|left, right| {
        left.confidence
            .rank()
            .cmp(&right.confidence.rank())
            .then_with(|| right.score.total_cmp(&left.score))
            .then_with(|| left.orphan.path.cmp(&right.orphan.path))
            .then_with(|| left.to.cmp(right.to))
    });

    let mut claimed_from = BTreeSet::new();
    let mut claimed_to = BTreeSet::new();
    let mut renames = Vec::new();
    for candidate in candidates {
        if claimed_from.contains(candidate.orphan.path.as_str()) || claimed_to.contains(candidate.to)
        {
            continue;
        }
        claimed_from.insert(candidate.orphan.path.as_str());
        claimed_to.insert(candidate.to);

        let mut reasons = candidate.orphan.ownership_reason_codes.clone();
        reasons.retain(|reason| *reason != OwnershipReason::NotShippedByTemplates);
        reasons.push(OwnershipReason::RenameDetected);
        renames.push(UpgradeRename {
            from: candidate.orphan.path.clone(),
            to: candidate.to.to_string(),
            ownership: candidate.orphan.ownership,
            ownership_state: OwnershipState::Renamed,
            ownership_reason_codes: reasons,
            confidence: candidate.confidence,
            detection: candidate.detection,
        });
    }

    renames.sort_by(|left, right| left.from.cmp(&right.from).then_with(|| left.to.cmp(&right.to)));
    debug!(renames = renames.len(), "detected template renames");
    renames
}
