use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use pagewatch_core::{
    update, ChangeOutcome, Effect, MonitoredResource, Msg, NotificationSettings, ResourceId,
};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;
use watch_logging::{watch_debug, watch_error, watch_info, watch_warn};

use crate::classify::{ChangeClassifier, ChangeJudge, JudgeError};
use crate::extract::{ExtractionScope, Extractor};
use crate::fetch::Fetcher;
use crate::notify::NotificationTransport;
use crate::store::{ResourceStore, SettingsStore, StoreError};
use crate::FetchError;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("classification failed: {0}")]
    Classification(#[from] JudgeError),
    #[error("resource {0} not found")]
    NotFound(ResourceId),
    #[error("notification settings missing or incomplete")]
    SettingsMissing,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// How the caller of [`Monitor::run_cycle`] waits for the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Return once every due resource has been processed.
    Awaited,
    /// Return immediately; the cycle keeps running on the tokio runtime.
    Detached,
}

pub enum CycleRun {
    Completed(CycleReport),
    Detached(JoinHandle<Result<CycleReport, MonitorError>>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    pub id: ResourceId,
    pub outcome: ChangeOutcome,
    /// A reportable change was recorded (first observation or substantive change).
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub notified: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotDue,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum EntryResult {
    Skipped { reason: SkipReason },
    Checked(CheckReport),
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleEntry {
    pub id: ResourceId,
    pub label: String,
    pub result: EntryResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub entries: Vec<CycleEntry>,
}

impl CycleReport {
    pub fn checked(&self) -> impl Iterator<Item = &CheckReport> {
        self.entries.iter().filter_map(|entry| match &entry.result {
            EntryResult::Checked(report) => Some(report),
            _ => None,
        })
    }

    pub fn failed_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches!(entry.result, EntryResult::Failed { .. }))
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches!(entry.result, EntryResult::Skipped { .. }))
            .count()
    }
}

/// Everything the monitor talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub resources: Arc<dyn ResourceStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub fetcher: Arc<dyn Fetcher>,
    pub extractor: Arc<dyn Extractor>,
    pub judge: Arc<dyn ChangeJudge>,
    pub transport: Arc<dyn NotificationTransport>,
}

#[derive(Clone)]
pub struct MonitorConfig {
    pub clock: Clock,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            clock: Arc::new(Utc::now),
        }
    }
}

/// Runs monitoring cycles and single forced checks.
///
/// Checks of the same resource id are serialized: a forced check and a bulk
/// cycle never process one resource at the same time.
#[derive(Clone)]
pub struct Monitor {
    resources: Arc<dyn ResourceStore>,
    settings: Arc<dyn SettingsStore>,
    fetcher: Arc<dyn Fetcher>,
    extractor: Arc<dyn Extractor>,
    classifier: ChangeClassifier,
    transport: Arc<dyn NotificationTransport>,
    clock: Clock,
    locks: Arc<IdLocks>,
}

impl Monitor {
    pub fn new(collaborators: Collaborators, config: MonitorConfig) -> Self {
        Self {
            resources: collaborators.resources,
            settings: collaborators.settings,
            fetcher: collaborators.fetcher,
            extractor: collaborators.extractor,
            classifier: ChangeClassifier::new(collaborators.judge),
            transport: collaborators.transport,
            clock: config.clock,
            locks: Arc::new(IdLocks::default()),
        }
    }

    /// Checks every due resource once.
    ///
    /// Notification settings are loaded once, before any resource is touched;
    /// missing settings abort the cycle. A failing resource is recorded as
    /// `error` and the cycle moves on to the next one.
    pub async fn run_cycle(&self, mode: ExecutionMode) -> Result<CycleRun, MonitorError> {
        let settings = self.load_settings().await?;
        match mode {
            ExecutionMode::Awaited => Ok(CycleRun::Completed(self.cycle(settings).await?)),
            ExecutionMode::Detached => {
                let monitor = self.clone();
                let handle = tokio::spawn(async move { monitor.cycle(settings).await });
                Ok(CycleRun::Detached(handle))
            }
        }
    }

    /// Forced check of one resource, bypassing the due predicate. Errors propagate.
    pub async fn check_now(&self, id: ResourceId) -> Result<CheckReport, MonitorError> {
        let _guard = self.locks.acquire(id).await;
        let resource = self
            .resources
            .get(id)
            .await?
            .ok_or(MonitorError::NotFound(id))?;
        let settings = self.load_settings().await?;
        self.check_resource(&resource, &settings).await
    }

    async fn load_settings(&self) -> Result<NotificationSettings, MonitorError> {
        match self.settings.notification_settings().await? {
            Some(settings) if settings.is_complete() => Ok(settings),
            _ => {
                watch_warn!("Notification settings missing or incomplete; not checking resources");
                Err(MonitorError::SettingsMissing)
            }
        }
    }

    async fn cycle(&self, settings: NotificationSettings) -> Result<CycleReport, MonitorError> {
        let started_at = (self.clock)();
        let candidates = self.resources.list().await?;
        watch_info!("Monitoring cycle started with {} resources", candidates.len());

        let mut entries = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let result = if candidate.is_due(started_at) {
                self.process_due(candidate.id, &settings).await
            } else {
                watch_debug!("Resource {} not due yet", candidate.id);
                EntryResult::Skipped {
                    reason: SkipReason::NotDue,
                }
            };
            entries.push(CycleEntry {
                id: candidate.id,
                label: candidate.label,
                result,
            });
        }
        self.locks.prune();

        let report = CycleReport {
            started_at,
            finished_at: (self.clock)(),
            entries,
        };
        watch_info!(
            "Monitoring cycle finished: {} checked, {} skipped, {} failed",
            report.checked().count(),
            report.skipped_count(),
            report.failed_count()
        );
        Ok(report)
    }

    /// Failure boundary for one resource inside a bulk cycle.
    async fn process_due(&self, id: ResourceId, settings: &NotificationSettings) -> EntryResult {
        let _guard = self.locks.acquire(id).await;

        // A forced check may have run or the record may be gone while we waited.
        let resource = match self.resources.get(id).await {
            Ok(Some(resource)) => resource,
            Ok(None) => {
                return EntryResult::Skipped {
                    reason: SkipReason::Deleted,
                }
            }
            Err(err) => {
                watch_error!("Failed to reload resource {}: {}", id, err);
                return EntryResult::Failed {
                    error: err.to_string(),
                };
            }
        };
        if !resource.is_due((self.clock)()) {
            return EntryResult::Skipped {
                reason: SkipReason::NotDue,
            };
        }

        match self.check_resource(&resource, settings).await {
            Ok(report) => EntryResult::Checked(report),
            Err(err) => EntryResult::Failed {
                error: err.to_string(),
            },
        }
    }

    /// fetch -> extract -> classify -> persist -> notify, strictly in that order.
    async fn check_resource(
        &self,
        resource: &MonitoredResource,
        settings: &NotificationSettings,
    ) -> Result<CheckReport, MonitorError> {
        let fetched = match self.fetcher.fetch(&resource.url).await {
            Ok(fetched) => fetched,
            Err(err) => {
                self.record_failure(resource, &err.to_string()).await;
                return Err(err.into());
            }
        };

        let extracted = self.extractor.extract(&fetched.html, &resource.locator);
        if extracted.scope == ExtractionScope::Fallback {
            watch_warn!(
                "Locator {:?} matched nothing for resource {}; monitoring the whole page",
                resource.locator,
                resource.id
            );
        }

        let classification = match self.classifier.classify(resource, &extracted.content).await {
            Ok(classification) => classification,
            Err(err) => {
                self.record_failure(resource, &err.to_string()).await;
                return Err(err.into());
            }
        };
        let outcome = classification.outcome();
        let summary = classification.summary().map(str::to_string);

        let (patch, effects) = update(
            resource,
            Msg::CheckSucceeded {
                snapshot: extracted.content,
                classification,
            },
            (self.clock)(),
        );
        self.resources.update(resource.id, patch).await?;
        watch_info!(
            "Resource {} ({}) checked: {:?}",
            resource.id,
            resource.url,
            outcome
        );

        let mut notified = false;
        for effect in effects {
            notified |= self.run_effect(effect, settings).await;
        }

        Ok(CheckReport {
            id: resource.id,
            outcome,
            changed: outcome != ChangeOutcome::Unchanged,
            summary,
            notified,
        })
    }

    /// The check's own error is what callers see; a failure to persist it is only logged.
    async fn record_failure(&self, resource: &MonitoredResource, reason: &str) {
        watch_warn!(
            "Check of resource {} ({}) failed: {}",
            resource.id,
            resource.url,
            reason
        );
        let (patch, _effects) = update(
            resource,
            Msg::CheckFailed {
                reason: reason.to_string(),
            },
            (self.clock)(),
        );
        if let Err(err) = self.resources.update(resource.id, patch).await {
            watch_error!(
                "Failed to record error status for resource {}: {}",
                resource.id,
                err
            );
        }
    }

    /// Notification failures are logged only; the state update is already persisted.
    async fn run_effect(&self, effect: Effect, settings: &NotificationSettings) -> bool {
        match effect {
            Effect::Notify { resource_id, text } => {
                match self.transport.send(settings, &text).await {
                    Ok(()) => {
                        watch_info!("Notification sent for resource {}", resource_id);
                        true
                    }
                    Err(err) => {
                        watch_warn!(
                            "Notification for resource {} failed: {}",
                            resource_id,
                            err
                        );
                        false
                    }
                }
            }
        }
    }
}

/// One async mutex per resource id.
#[derive(Default)]
struct IdLocks {
    inner: Mutex<HashMap<ResourceId, Arc<tokio::sync::Mutex<()>>>>,
}

impl IdLocks {
    async fn acquire(&self, id: ResourceId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            map.entry(id).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Drops locks nobody holds or waits on.
    fn prune(&self) {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}
