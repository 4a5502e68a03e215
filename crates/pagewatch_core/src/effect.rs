use crate::ResourceId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Send `text` to the configured notification channel.
    Notify { resource_id: ResourceId, text: String },
}
