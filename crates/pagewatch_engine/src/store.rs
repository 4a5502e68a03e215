use std::collections::BTreeMap;
use std::sync::Mutex;

use pagewatch_core::{MonitoredResource, NewResource, NotificationSettings, ResourceId, ResourcePatch};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("resource {0} not found")]
    NotFound(ResourceId),
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Persistence of monitored resources. Ids are assigned by the store and never reused.
#[async_trait::async_trait]
pub trait ResourceStore: Send + Sync {
    async fn list(&self) -> Result<Vec<MonitoredResource>, StoreError>;
    async fn get(&self, id: ResourceId) -> Result<Option<MonitoredResource>, StoreError>;
    async fn create(&self, fields: NewResource) -> Result<ResourceId, StoreError>;
    async fn update(&self, id: ResourceId, patch: ResourcePatch) -> Result<(), StoreError>;
    async fn delete(&self, id: ResourceId) -> Result<(), StoreError>;
}

#[async_trait::async_trait]
pub trait SettingsStore: Send + Sync {
    async fn notification_settings(&self) -> Result<Option<NotificationSettings>, StoreError>;
}

/// Resource table with a monotonically increasing id counter.
#[derive(Debug, Clone, Default)]
pub struct ResourceTable {
    resources: BTreeMap<ResourceId, MonitoredResource>,
    next_id: ResourceId,
}

impl ResourceTable {
    /// Rebuilds a table from persisted rows. `next_id` is raised above every existing id.
    pub fn from_parts(resources: Vec<MonitoredResource>, next_id: ResourceId) -> Self {
        let highest = resources.iter().map(|r| r.id).max().unwrap_or(0);
        Self {
            next_id: next_id.max(highest + 1).max(1),
            resources: resources.into_iter().map(|r| (r.id, r)).collect(),
        }
    }

    pub fn next_id(&self) -> ResourceId {
        self.next_id.max(1)
    }

    pub fn list(&self) -> Vec<MonitoredResource> {
        self.resources.values().cloned().collect()
    }

    pub fn get(&self, id: ResourceId) -> Option<MonitoredResource> {
        self.resources.get(&id).cloned()
    }

    pub fn create(&mut self, fields: NewResource) -> ResourceId {
        let id = self.next_id();
        self.next_id = id + 1;
        self.resources.insert(id, MonitoredResource::new(id, fields));
        id
    }

    pub fn update(&mut self, id: ResourceId, patch: &ResourcePatch) -> Result<(), StoreError> {
        let resource = self.resources.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        resource.apply(patch);
        Ok(())
    }

    pub fn delete(&mut self, id: ResourceId) -> Result<(), StoreError> {
        self.resources
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }
}

/// In-process store, used by tests and embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryResourceStore {
    table: Mutex<ResourceTable>,
}

impl MemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_table<T>(&self, f: impl FnOnce(&mut ResourceTable) -> T) -> Result<T, StoreError> {
        let mut table = self
            .table
            .lock()
            .map_err(|_| StoreError::Backend("resource table lock poisoned".into()))?;
        Ok(f(&mut table))
    }
}

#[async_trait::async_trait]
impl ResourceStore for MemoryResourceStore {
    async fn list(&self) -> Result<Vec<MonitoredResource>, StoreError> {
        self.with_table(|table| table.list())
    }

    async fn get(&self, id: ResourceId) -> Result<Option<MonitoredResource>, StoreError> {
        self.with_table(|table| table.get(id))
    }

    async fn create(&self, fields: NewResource) -> Result<ResourceId, StoreError> {
        self.with_table(|table| table.create(fields))
    }

    async fn update(&self, id: ResourceId, patch: ResourcePatch) -> Result<(), StoreError> {
        self.with_table(|table| table.update(id, &patch))?
    }

    async fn delete(&self, id: ResourceId) -> Result<(), StoreError> {
        self.with_table(|table| table.delete(id))?
    }
}

/// Fixed settings, e.g. loaded once from the environment.
#[derive(Debug, Clone, Default)]
pub struct StaticSettingsStore {
    settings: Option<NotificationSettings>,
}

impl StaticSettingsStore {
    pub fn new(settings: Option<NotificationSettings>) -> Self {
        Self { settings }
    }
}

#[async_trait::async_trait]
impl SettingsStore for StaticSettingsStore {
    async fn notification_settings(&self) -> Result<Option<NotificationSettings>, StoreError> {
        Ok(self.settings.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::ResourceTable;
    use pagewatch_core::NewResource;

    fn fields() -> NewResource {
        NewResource::validated("https://example.com", "Example", 5, "").unwrap()
    }

    #[test]
    fn ids_are_never_reused_after_delete() {
        let mut table = ResourceTable::default();
        let first = table.create(fields());
        let second = table.create(fields());
        table.delete(second).unwrap();
        let third = table.create(fields());

        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(third, 3);
    }

    #[test]
    fn restored_table_continues_after_highest_id() {
        let mut seed = ResourceTable::default();
        seed.create(fields());
        seed.create(fields());
        let table = ResourceTable::from_parts(seed.list(), 0);
        assert_eq!(table.next_id(), 3);
    }
}
