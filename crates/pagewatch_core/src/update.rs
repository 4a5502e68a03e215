use chrono::{DateTime, Utc};

use crate::{Classification, Effect, MonitoredResource, Msg, ResourcePatch, ResourceStatus};

/// Pure transition function: computes the record update and effects for one check.
///
/// A failed check only touches `status` and `last_checked_at`; the stored
/// snapshot is never overwritten by a failure.
pub fn update(
    resource: &MonitoredResource,
    msg: Msg,
    now: DateTime<Utc>,
) -> (ResourcePatch, Vec<Effect>) {
    match msg {
        Msg::CheckFailed { .. } => {
            let patch = ResourcePatch {
                status: Some(ResourceStatus::Error),
                last_checked_at: Some(now),
                ..ResourcePatch::default()
            };
            (patch, Vec::new())
        }
        Msg::CheckSucceeded {
            snapshot,
            classification,
        } => {
            let mut patch = ResourcePatch {
                status: Some(ResourceStatus::Active),
                last_checked_at: Some(now),
                ..ResourcePatch::default()
            };
            if snapshot != resource.last_content_snapshot {
                patch.last_content_snapshot = Some(snapshot);
            }

            let mut effects = Vec::new();
            match classification {
                Classification::FirstObservation {
                    summary,
                    notice_found,
                } => {
                    if notice_found {
                        effects.push(notify(resource, &summary));
                    }
                    patch.last_updated_at = Some(now);
                    patch.last_change_summary = Some(summary);
                }
                Classification::Changed { summary } => {
                    effects.push(notify(resource, &summary));
                    patch.last_updated_at = Some(now);
                    patch.last_change_summary = Some(summary);
                }
                Classification::Unchanged { .. } => {}
            }
            (patch, effects)
        }
    }
}

fn notify(resource: &MonitoredResource, summary: &str) -> Effect {
    Effect::Notify {
        resource_id: resource.id,
        text: notification_text(resource, summary),
    }
}

/// Message body sent for a reportable change.
pub fn notification_text(resource: &MonitoredResource, summary: &str) -> String {
    format!(
        "🔔 {label}\n\n{summary}\n\n{url}",
        label = resource.label,
        summary = summary.trim(),
        url = resource.url
    )
}
