use std::sync::Once;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use pagewatch_core::{
    update, Classification, Effect, MonitoredResource, Msg, NewResource, ResourcePatch,
    ResourceStatus, ACTIVATED_SUMMARY, NEVER,
};
use pretty_assertions::assert_eq;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(watch_logging::initialize_for_tests);
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn new_resource() -> MonitoredResource {
    let fields = NewResource::validated("https://example.com/board", "Board", 10, "").unwrap();
    MonitoredResource::new(7, fields)
}

fn applied(resource: &MonitoredResource, patch: &ResourcePatch) -> MonitoredResource {
    let mut next = resource.clone();
    next.apply(patch);
    next
}

#[test]
fn created_resource_starts_inactive_with_sentinels() {
    init_logging();
    let resource = new_resource();

    assert_eq!(resource.status, ResourceStatus::Inactive);
    assert_eq!(resource.last_checked_at, NEVER);
    assert_eq!(resource.last_updated_at, NEVER);
    assert!(resource.last_content_snapshot.is_empty());
    assert!(resource.is_due(now()));
}

#[test]
fn first_observation_without_notice_activates_silently() {
    init_logging();
    let resource = new_resource();

    let (patch, effects) = update(
        &resource,
        Msg::CheckSucceeded {
            snapshot: "<html>A</html>".to_string(),
            classification: Classification::FirstObservation {
                summary: ACTIVATED_SUMMARY.to_string(),
                notice_found: false,
            },
        },
        now(),
    );
    let next = applied(&resource, &patch);

    assert!(effects.is_empty());
    assert_eq!(next.status, ResourceStatus::Active);
    assert_eq!(next.last_content_snapshot, "<html>A</html>");
    assert_eq!(next.last_checked_at, now());
    assert_eq!(next.last_updated_at, now());
    assert_eq!(next.last_change_summary, ACTIVATED_SUMMARY);
}

#[test]
fn first_observation_with_notice_notifies_once() {
    init_logging();
    let resource = new_resource();

    let (_patch, effects) = update(
        &resource,
        Msg::CheckSucceeded {
            snapshot: "<p>Sale</p>".to_string(),
            classification: Classification::FirstObservation {
                summary: "Latest entry: Sale".to_string(),
                notice_found: true,
            },
        },
        now(),
    );

    assert_eq!(effects.len(), 1);
    let Effect::Notify { resource_id, text } = &effects[0];
    assert_eq!(*resource_id, 7);
    assert!(text.contains("Board"));
    assert!(text.contains("Latest entry: Sale"));
    assert!(text.contains("https://example.com/board"));
}

#[test]
fn unchanged_only_advances_checked_timestamp() {
    init_logging();
    let mut resource = new_resource();
    resource.status = ResourceStatus::Active;
    resource.last_content_snapshot = "<html>A</html>".to_string();
    resource.last_updated_at = now() - TimeDelta::hours(2);
    resource.last_checked_at = now() - TimeDelta::hours(1);
    resource.last_change_summary = "old".to_string();

    let (patch, effects) = update(
        &resource,
        Msg::CheckSucceeded {
            snapshot: "<html>A</html>".to_string(),
            classification: Classification::Unchanged { identical: true },
        },
        now(),
    );
    let next = applied(&resource, &patch);

    assert!(effects.is_empty());
    assert_eq!(patch.last_content_snapshot, None);
    assert_eq!(next.last_checked_at, now());
    assert_eq!(next.last_updated_at, resource.last_updated_at);
    assert_eq!(next.last_change_summary, "old");
}

#[test]
fn changed_updates_snapshot_summary_and_notifies() {
    init_logging();
    let mut resource = new_resource();
    resource.status = ResourceStatus::Active;
    resource.last_content_snapshot = "<html>A</html>".to_string();

    let (patch, effects) = update(
        &resource,
        Msg::CheckSucceeded {
            snapshot: "<html>A<p>New item</p></html>".to_string(),
            classification: Classification::Changed {
                summary: "- New item".to_string(),
            },
        },
        now(),
    );
    let next = applied(&resource, &patch);

    assert_eq!(next.last_content_snapshot, "<html>A<p>New item</p></html>");
    assert_eq!(next.last_change_summary, "- New item");
    assert_eq!(next.last_updated_at, now());
    assert_eq!(effects.len(), 1);
}

#[test]
fn failure_marks_error_and_keeps_snapshot() {
    init_logging();
    let mut resource = new_resource();
    resource.status = ResourceStatus::Active;
    resource.last_content_snapshot = "<html>A</html>".to_string();

    let (patch, effects) = update(
        &resource,
        Msg::CheckFailed {
            reason: "http status 500".to_string(),
        },
        now(),
    );
    let next = applied(&resource, &patch);

    assert!(effects.is_empty());
    assert_eq!(next.status, ResourceStatus::Error);
    assert_eq!(next.last_checked_at, now());
    assert_eq!(next.last_content_snapshot, "<html>A</html>");
    assert_eq!(next.last_updated_at, resource.last_updated_at);
}

#[test]
fn success_after_error_reactivates() {
    init_logging();
    let mut resource = new_resource();
    resource.status = ResourceStatus::Error;
    resource.last_content_snapshot = "<html>A</html>".to_string();

    let (patch, _effects) = update(
        &resource,
        Msg::CheckSucceeded {
            snapshot: "<html>A</html>".to_string(),
            classification: Classification::Unchanged { identical: true },
        },
        now(),
    );

    assert_eq!(applied(&resource, &patch).status, ResourceStatus::Active);
}

#[test]
fn edit_patch_only_touches_user_fields() {
    init_logging();
    let resource = new_resource();
    let patch = ResourcePatch::edit(None, Some(" Renamed "), Some(30), None).unwrap();
    let next = applied(&resource, &patch);

    assert_eq!(next.label, "Renamed");
    assert_eq!(next.check_interval_minutes, 30);
    assert_eq!(next.url, resource.url);
    assert_eq!(next.status, ResourceStatus::Inactive);
    assert!(ResourcePatch::edit(None, None, Some(0), None).is_err());
}
