use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;
use pagewatch_core::{MonitoredResource, NewResource, NotificationSettings, ResourceId, ResourcePatch};
use pagewatch_engine::{AtomicFileWriter, ResourceStore, ResourceTable, SettingsStore, StoreError};
use serde::{Deserialize, Serialize};
use watch_logging::{watch_debug, watch_error};

pub const STATE_FILENAME: &str = ".pagewatch_state.ron";
/// Serializes access to the state file across processes.
pub const STATE_LOCK_FILENAME: &str = ".pagewatch_state.lock";
/// Held for a whole monitoring cycle or forced check.
pub const MONITOR_LOCK_FILENAME: &str = ".pagewatch_monitor.lock";

/// Exclusive advisory lock on a file, released when dropped.
#[derive(Debug)]
pub struct FileLockGuard {
    _file: File,
}

impl FileLockGuard {
    /// Blocks until no other holder, in this or another process, has the lock.
    pub fn acquire(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        file.lock_exclusive()?;
        Ok(Self { _file: file })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PersistedState {
    #[serde(default)]
    next_id: ResourceId,
    #[serde(default)]
    resources: Vec<MonitoredResource>,
    #[serde(default)]
    notification: Option<NotificationSettings>,
}

/// Resource and settings store backed by one RON file in the data directory.
///
/// Every operation re-reads the file under an exclusive lock on a sidecar
/// file, so a CLI command next to a running daemon neither misses nor
/// overwrites the other's edits.
pub struct RonFileStore {
    dir: PathBuf,
    writer: AtomicFileWriter,
}

impl RonFileStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            writer: AtomicFileWriter::new(dir.to_path_buf()),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(STATE_FILENAME)
    }

    /// Waits for the lock that keeps monitoring work on this data directory
    /// to one process at a time.
    pub async fn lock_monitoring(&self) -> Result<FileLockGuard, StoreError> {
        let path = self.dir.join(MONITOR_LOCK_FILENAME);
        let display = path.display().to_string();
        tokio::task::spawn_blocking(move || FileLockGuard::acquire(&path))
            .await
            .map_err(|err| StoreError::Backend(format!("lock task failed: {err}")))?
            .map_err(|err| StoreError::Backend(format!("failed to lock {display}: {err}")))
    }

    pub fn set_notification_settings(
        &self,
        settings: NotificationSettings,
    ) -> Result<(), StoreError> {
        self.transaction(|state| {
            state.notification = Some(settings);
            Ok(())
        })
    }

    fn load(&self) -> Result<PersistedState, StoreError> {
        let path = self.path();
        let content = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                watch_debug!("No state file at {:?}; starting empty", path);
                return Ok(PersistedState::default());
            }
            Err(err) => {
                return Err(StoreError::Backend(format!(
                    "failed to read {}: {err}",
                    path.display()
                )))
            }
        };

        ron::from_str(&content).map_err(|err| {
            StoreError::Backend(format!("failed to parse {}: {err}", path.display()))
        })
    }

    fn save(&self, state: &PersistedState) -> Result<(), StoreError> {
        let pretty = ron::ser::PrettyConfig::new();
        let content = ron::ser::to_string_pretty(state, pretty)
            .map_err(|err| StoreError::Backend(format!("failed to serialize state: {err}")))?;
        self.writer.write(STATE_FILENAME, &content).map_err(|err| {
            watch_error!("Failed to write state to {:?}: {}", self.dir, err);
            StoreError::Backend(err.to_string())
        })?;
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&PersistedState) -> T) -> Result<T, StoreError> {
        let _lock = self.lock()?;
        Ok(f(&self.load()?))
    }

    /// Load, mutate and write back. Nothing is written when `f` fails.
    fn transaction<T>(
        &self,
        f: impl FnOnce(&mut PersistedState) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let _lock = self.lock()?;
        let mut state = self.load()?;
        let value = f(&mut state)?;
        self.save(&state)?;
        Ok(value)
    }

    fn lock(&self) -> Result<FileLockGuard, StoreError> {
        let path = self.dir.join(STATE_LOCK_FILENAME);
        FileLockGuard::acquire(&path).map_err(|err| {
            StoreError::Backend(format!("failed to lock {}: {err}", path.display()))
        })
    }
}

/// Applies a table operation to the persisted rows and id counter.
fn with_table<T>(
    state: &mut PersistedState,
    f: impl FnOnce(&mut ResourceTable) -> Result<T, StoreError>,
) -> Result<T, StoreError> {
    let mut table = ResourceTable::from_parts(std::mem::take(&mut state.resources), state.next_id);
    let result = f(&mut table);
    state.next_id = table.next_id();
    state.resources = table.list();
    result
}

#[async_trait::async_trait]
impl ResourceStore for RonFileStore {
    async fn list(&self) -> Result<Vec<MonitoredResource>, StoreError> {
        self.read(|state| state.resources.clone())
    }

    async fn get(&self, id: ResourceId) -> Result<Option<MonitoredResource>, StoreError> {
        self.read(|state| state.resources.iter().find(|r| r.id == id).cloned())
    }

    async fn create(&self, fields: NewResource) -> Result<ResourceId, StoreError> {
        self.transaction(|state| with_table(state, |table| Ok(table.create(fields))))
    }

    async fn update(&self, id: ResourceId, patch: ResourcePatch) -> Result<(), StoreError> {
        self.transaction(|state| with_table(state, |table| table.update(id, &patch)))
    }

    async fn delete(&self, id: ResourceId) -> Result<(), StoreError> {
        self.transaction(|state| with_table(state, |table| table.delete(id)))
    }
}

#[async_trait::async_trait]
impl SettingsStore for RonFileStore {
    async fn notification_settings(&self) -> Result<Option<NotificationSettings>, StoreError> {
        self.read(|state| state.notification.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use pagewatch_core::ResourceStatus;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn fields(url: &str) -> NewResource {
        NewResource::validated(url, "", 10, "").unwrap()
    }

    #[tokio::test]
    async fn missing_file_is_an_empty_store() {
        let temp = TempDir::new().unwrap();
        let store = RonFileStore::new(temp.path());

        assert!(store.list().await.unwrap().is_empty());
        assert_eq!(store.notification_settings().await.unwrap(), None);
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn resources_survive_reopening() {
        let temp = TempDir::new().unwrap();
        let store = RonFileStore::new(temp.path());
        let id = store.create(fields("https://a.example.com")).await.unwrap();
        store
            .update(
                id,
                ResourcePatch {
                    status: Some(ResourceStatus::Active),
                    last_content_snapshot: Some("<p>A</p>".into()),
                    ..ResourcePatch::default()
                },
            )
            .await
            .unwrap();

        let reopened = RonFileStore::new(temp.path());
        let resource = reopened.get(id).await.unwrap().unwrap();
        assert_eq!(resource.url, "https://a.example.com/");
        assert_eq!(resource.status, ResourceStatus::Active);
        assert_eq!(resource.last_content_snapshot, "<p>A</p>");
    }

    #[tokio::test]
    async fn deleted_ids_are_not_reused() {
        let temp = TempDir::new().unwrap();
        let store = RonFileStore::new(temp.path());
        let first = store.create(fields("https://a.example.com")).await.unwrap();
        store.delete(first).await.unwrap();
        let second = store.create(fields("https://b.example.com")).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_ids_are_reported() {
        let temp = TempDir::new().unwrap();
        let store = RonFileStore::new(temp.path());
        assert!(matches!(store.delete(9).await, Err(StoreError::NotFound(9))));
        assert!(matches!(
            store.update(9, ResourcePatch::default()).await,
            Err(StoreError::NotFound(9))
        ));
    }

    #[tokio::test]
    async fn settings_are_persisted() {
        let temp = TempDir::new().unwrap();
        let store = RonFileStore::new(temp.path());
        let settings = NotificationSettings {
            bot_token: "t".into(),
            chat_id: "c".into(),
        };
        store.set_notification_settings(settings.clone()).unwrap();

        let reopened = RonFileStore::new(temp.path());
        assert_eq!(reopened.notification_settings().await.unwrap(), Some(settings));
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error_not_an_empty_store() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(STATE_FILENAME), "not ron at all (").unwrap();
        let store = RonFileStore::new(temp.path());

        assert!(matches!(store.list().await, Err(StoreError::Backend(_))));
    }

    #[test]
    fn separate_store_instances_do_not_lose_writes() {
        let temp = TempDir::new().unwrap();
        let workers: Vec<_> = (0..2)
            .map(|worker| {
                let dir = temp.path().to_path_buf();
                thread::spawn(move || {
                    let runtime = tokio::runtime::Builder::new_current_thread()
                        .build()
                        .unwrap();
                    let store = RonFileStore::new(&dir);
                    runtime.block_on(async {
                        let mut ids = Vec::new();
                        for n in 0..50 {
                            let url = format!("https://w{worker}.example.com/{n}");
                            ids.push(store.create(fields(&url)).await.unwrap());
                        }
                        ids
                    })
                })
            })
            .collect();
        let ids: Vec<ResourceId> = workers
            .into_iter()
            .flat_map(|worker| worker.join().unwrap())
            .collect();

        let distinct: BTreeSet<_> = ids.iter().copied().collect();
        assert_eq!(distinct.len(), 100);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let persisted = runtime
            .block_on(RonFileStore::new(temp.path()).list())
            .unwrap();
        let persisted: BTreeSet<_> = persisted.iter().map(|r| r.id).collect();
        assert_eq!(persisted, distinct);
    }

    #[tokio::test]
    async fn monitoring_lock_is_exclusive_across_instances() {
        let temp = TempDir::new().unwrap();
        let held = RonFileStore::new(temp.path()).lock_monitoring().await.unwrap();

        let acquired = Arc::new(AtomicBool::new(false));
        let waiter = {
            let acquired = acquired.clone();
            let dir = temp.path().to_path_buf();
            thread::spawn(move || {
                let _guard = FileLockGuard::acquire(&dir.join(MONITOR_LOCK_FILENAME)).unwrap();
                acquired.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(100));
        assert!(!acquired.load(Ordering::SeqCst));
        drop(held);
        waiter.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }
}
