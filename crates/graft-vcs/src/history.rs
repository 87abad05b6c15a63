use crate::repo::GitRepository;
use graft_core::error::VcsError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// How the recorded import point relates to the new remote head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RangeStatus {
    /// Clean history; diff the original range.
    Normal,
    /// Upstream diverged (force-push/rebase) but shares an ancestor; the
    /// merge-base becomes the new "from" and the integration is flagged.
    Rewritten { merge_base: String },
    /// The recorded commit is gone or histories are unrelated; the only
    /// safe recovery is a fresh import.
    ReimportRequired,
}

/// A safe commit range for diffing, with the integrity verdict attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffRange {
    pub from: Option<String>,
    pub to: String,
    pub status: RangeStatus,
}

/// Decide a safe diff range between the last recorded import point and a
/// new remote head, detecting destructive history rewrites.
pub fn safe_diff_range(
    vcs: &dyn GitRepository,
    mirror: &Path,
    from: &str,
    to: &str,
) -> Result<DiffRange, VcsError> {
    if !vcs.commit_exists(mirror, from)? {
        warn!(from, "recorded import commit no longer exists upstream");
        let fallback = vcs.head(mirror).ok();
        return Ok(DiffRange {
            from: fallback,
            to: to.to_string(),
            status: RangeStatus::ReimportRequired,
        });
    }

    if !vcs.is_ancestor(mirror, from, to)? {
        return match vcs.merge_base(mirror, from, to)? {
            Some(base) => Ok(DiffRange {
                from: Some(base.clone()),
                to: to.to_string(),
                status: RangeStatus::Rewritten { merge_base: base },
            }),
            None => Ok(DiffRange {
                from: None,
                to: to.to_string(),
                status: RangeStatus::ReimportRequired,
            }),
        };
    }

    Ok(DiffRange {
        from: Some(from.to_string()),
        to: to.to_string(),
        status: RangeStatus::Normal,
    })
}
