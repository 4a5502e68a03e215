use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

pub type ResourceId = u64;

/// Timestamp used for "never happened".
pub const NEVER: DateTime<Utc> = DateTime::<Utc>::UNIX_EPOCH;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    /// Never completed a successful check.
    #[default]
    Inactive,
    Active,
    Error,
}

impl ResourceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceStatus::Inactive => "inactive",
            ResourceStatus::Active => "active",
            ResourceStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredResource {
    pub id: ResourceId,
    pub url: String,
    pub label: String,
    pub check_interval_minutes: u32,
    /// Sub-content selector; empty means the whole document.
    #[serde(default)]
    pub locator: String,
    #[serde(default)]
    pub status: ResourceStatus,
    pub last_checked_at: DateTime<Utc>,
    #[serde(default)]
    pub last_content_snapshot: String,
    pub last_updated_at: DateTime<Utc>,
    #[serde(default)]
    pub last_change_summary: String,
}

impl MonitoredResource {
    /// Builds the initial record for a validated creation request.
    pub fn new(id: ResourceId, fields: NewResource) -> Self {
        Self {
            id,
            url: fields.url,
            label: fields.label,
            check_interval_minutes: fields.check_interval_minutes,
            locator: fields.locator,
            status: ResourceStatus::Inactive,
            last_checked_at: NEVER,
            last_content_snapshot: String::new(),
            last_updated_at: NEVER,
            last_change_summary: String::new(),
        }
    }

    pub fn check_interval(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.check_interval_minutes.max(1)))
    }

    /// Inactive resources are always due; everything else once the interval has elapsed.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if self.status == ResourceStatus::Inactive {
            return true;
        }
        now.signed_duration_since(self.last_checked_at) >= self.check_interval()
    }

    pub fn has_snapshot(&self) -> bool {
        !self.last_content_snapshot.is_empty()
    }

    pub fn apply(&mut self, patch: &ResourcePatch) {
        if let Some(url) = &patch.url {
            self.url = url.clone();
        }
        if let Some(label) = &patch.label {
            self.label = label.clone();
        }
        if let Some(minutes) = patch.check_interval_minutes {
            self.check_interval_minutes = minutes;
        }
        if let Some(locator) = &patch.locator {
            self.locator = locator.clone();
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(at) = patch.last_checked_at {
            self.last_checked_at = at;
        }
        if let Some(snapshot) = &patch.last_content_snapshot {
            self.last_content_snapshot = snapshot.clone();
        }
        if let Some(at) = patch.last_updated_at {
            self.last_updated_at = at;
        }
        if let Some(summary) = &patch.last_change_summary {
            self.last_change_summary = summary.clone();
        }
    }
}

/// Fields supplied when a resource is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewResource {
    pub url: String,
    pub label: String,
    pub check_interval_minutes: u32,
    pub locator: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("check interval must be at least one minute")]
    IntervalTooShort,
}

impl NewResource {
    /// Normalizes and validates user input. An empty label falls back to the URL.
    pub fn validated(
        url: &str,
        label: &str,
        check_interval_minutes: u32,
        locator: &str,
    ) -> Result<Self, ValidationError> {
        let url = validate_url(url)?;
        validate_interval(check_interval_minutes)?;
        let label = match label.trim() {
            "" => url.clone(),
            trimmed => trimmed.to_string(),
        };
        Ok(Self {
            url,
            label,
            check_interval_minutes,
            locator: locator.trim().to_string(),
        })
    }
}

/// Partial update of a resource record. `None` leaves a field untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourcePatch {
    pub url: Option<String>,
    pub label: Option<String>,
    pub check_interval_minutes: Option<u32>,
    pub locator: Option<String>,
    pub status: Option<ResourceStatus>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_content_snapshot: Option<String>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub last_change_summary: Option<String>,
}

impl ResourcePatch {
    /// Edit of user-owned fields, validated like a creation request.
    pub fn edit(
        url: Option<&str>,
        label: Option<&str>,
        check_interval_minutes: Option<u32>,
        locator: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let url = url.map(validate_url).transpose()?;
        if let Some(minutes) = check_interval_minutes {
            validate_interval(minutes)?;
        }
        Ok(Self {
            url,
            label: label.map(|l| l.trim().to_string()),
            check_interval_minutes,
            locator: locator.map(|l| l.trim().to_string()),
            ..Self::default()
        })
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn validate_url(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    let parsed = Url::parse(trimmed).map_err(|err| ValidationError::InvalidUrl {
        url: trimmed.to_string(),
        reason: err.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed.to_string()),
        other => Err(ValidationError::InvalidUrl {
            url: trimmed.to_string(),
            reason: format!("unsupported scheme {other}"),
        }),
    }
}

fn validate_interval(minutes: u32) -> Result<(), ValidationError> {
    if minutes == 0 {
        return Err(ValidationError::IntervalTooShort);
    }
    Ok(())
}

/// Global notification channel configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub bot_token: String,
    pub chat_id: String,
}

impl NotificationSettings {
    pub fn is_complete(&self) -> bool {
        !self.bot_token.trim().is_empty() && !self.chat_id.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active_resource(interval: u32, last_checked_at: DateTime<Utc>) -> MonitoredResource {
        let mut resource = MonitoredResource::new(
            1,
            NewResource::validated("https://example.com", "Example", interval, "").unwrap(),
        );
        resource.status = ResourceStatus::Active;
        resource.last_checked_at = last_checked_at;
        resource
    }

    #[test]
    fn due_only_once_interval_elapsed() {
        let now = Utc::now();
        let nine = active_resource(10, now - TimeDelta::minutes(9));
        let ten = active_resource(10, now - TimeDelta::minutes(10));
        let eleven = active_resource(10, now - TimeDelta::minutes(11));

        assert!(!nine.is_due(now));
        assert!(ten.is_due(now));
        assert!(eleven.is_due(now));
    }

    #[test]
    fn inactive_is_always_due() {
        let now = Utc::now();
        let mut resource = active_resource(10, now);
        resource.status = ResourceStatus::Inactive;
        assert!(resource.is_due(now));
    }

    #[test]
    fn errored_resource_waits_for_its_interval() {
        let now = Utc::now();
        let mut resource = active_resource(30, now - TimeDelta::minutes(5));
        resource.status = ResourceStatus::Error;
        assert!(!resource.is_due(now));
    }

    #[test]
    fn validation_rejects_relative_urls_and_zero_interval() {
        assert!(matches!(
            NewResource::validated("/relative", "", 5, ""),
            Err(ValidationError::InvalidUrl { .. })
        ));
        assert!(matches!(
            NewResource::validated("ftp://example.com", "", 5, ""),
            Err(ValidationError::InvalidUrl { .. })
        ));
        assert_eq!(
            NewResource::validated("https://example.com", "", 0, ""),
            Err(ValidationError::IntervalTooShort)
        );
    }

    #[test]
    fn validation_trims_and_defaults_label() {
        let fields = NewResource::validated(" https://example.com/news ", " ", 15, " #board ").unwrap();
        assert_eq!(fields.url, "https://example.com/news");
        assert_eq!(fields.label, "https://example.com/news");
        assert_eq!(fields.locator, "#board");
    }

    #[test]
    fn incomplete_settings_are_detected() {
        let settings = NotificationSettings {
            bot_token: "token".into(),
            chat_id: "  ".into(),
        };
        assert!(!settings.is_complete());
    }
}
