//! Conservative field merge: fill empty catalog fields from a post, never overwrite.

use stashtag_adapters::{Catalog, CatalogError};
use stashtag_core::{
    normalize_date, CatalogEntry, DateParseError, MergeDecision, PostRecord, SceneUpdate,
};
use tracing::{info, warn};

/// What to do when a post's publication timestamp cannot be parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DatePolicy {
    /// Fail the merge; the run stops with an error.
    #[default]
    Abort,
    /// Leave the date unassigned and merge the other fields.
    SkipField,
}

/// Strict merge: an unparseable timestamp is an error.
pub fn merge_fields(
    entry: &CatalogEntry,
    post: &PostRecord,
) -> Result<MergeDecision, DateParseError> {
    merge_fields_with(entry, post, DatePolicy::Abort)
}

pub fn merge_fields_with(
    entry: &CatalogEntry,
    post: &PostRecord,
    policy: DatePolicy,
) -> Result<MergeDecision, DateParseError> {
    let date = if is_blank(&entry.date) {
        match normalize_date(&post.published_at) {
            Ok(date) => non_empty(date),
            Err(err) if policy == DatePolicy::SkipField => {
                warn!(scene_id = entry.id, post_id = %post.external_id, %err, "leaving date unset");
                None
            }
            Err(err) => return Err(err),
        }
    } else {
        None
    };

    Ok(MergeDecision {
        title: fill(&entry.title, &post.title),
        details: fill(&entry.details, &post.description),
        date,
    })
}

fn is_blank(current: &Option<String>) -> bool {
    current.as_deref().map_or(true, str::is_empty)
}

fn fill(current: &Option<String>, candidate: &str) -> Option<String> {
    if is_blank(current) {
        non_empty(candidate.to_string())
    } else {
        None
    }
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

#[derive(Debug)]
pub enum MergeOutcome {
    /// Nothing to fill; no request was made.
    Unchanged,
    /// A write was warranted but suppressed.
    DryRun(MergeDecision),
    Updated(CatalogEntry),
    Failed(CatalogError),
}

/// Send the decision to the catalog if it assigns anything. Each update is attempted once.
pub async fn apply_decision(
    catalog: &dyn Catalog,
    entry: &CatalogEntry,
    decision: MergeDecision,
    dry_run: bool,
) -> MergeOutcome {
    if decision.is_empty() {
        info!(scene_id = entry.id, "scene already complete");
        return MergeOutcome::Unchanged;
    }

    let fields = decision.assigned_fields().join(",");
    if dry_run {
        info!(scene_id = entry.id, fields = %fields, "dry run: would update scene");
        return MergeOutcome::DryRun(decision);
    }

    match catalog.update_scene(&SceneUpdate::from_decision(entry.id, &decision)).await {
        Ok(updated) => {
            info!(
                scene_id = updated.id,
                fields = %fields,
                title = ?updated.title,
                date = ?updated.date,
                "tagged scene"
            );
            MergeOutcome::Updated(updated)
        }
        Err(err) => {
            warn!(scene_id = entry.id, fields = %fields, %err, "scene update failed");
            MergeOutcome::Failed(err)
        }
    }
}
