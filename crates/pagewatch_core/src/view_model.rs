use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{MonitoredResource, ResourceId, ResourceStatus, NEVER};

/// Row shown by listing commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceRow {
    pub id: ResourceId,
    pub label: String,
    pub url: String,
    pub status: ResourceStatus,
    pub check_interval_minutes: u32,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub last_change_summary: Option<String>,
    pub due: bool,
}

impl ResourceRow {
    pub fn from_resource(resource: &MonitoredResource, now: DateTime<Utc>) -> Self {
        Self {
            id: resource.id,
            label: resource.label.clone(),
            url: resource.url.clone(),
            status: resource.status,
            check_interval_minutes: resource.check_interval_minutes,
            last_checked_at: known(resource.last_checked_at),
            last_updated_at: known(resource.last_updated_at),
            last_change_summary: Some(resource.last_change_summary.clone())
                .filter(|summary| !summary.is_empty()),
            due: resource.is_due(now),
        }
    }
}

fn known(at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    (at != NEVER).then_some(at)
}

/// Rows in ascending id order.
pub fn resource_rows(resources: &[MonitoredResource], now: DateTime<Utc>) -> Vec<ResourceRow> {
    let mut rows: Vec<_> = resources
        .iter()
        .map(|resource| ResourceRow::from_resource(resource, now))
        .collect();
    rows.sort_by_key(|row| row.id);
    rows
}
