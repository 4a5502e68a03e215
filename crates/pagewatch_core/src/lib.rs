//! PageWatch core: resource model, due predicate and the pure check transition.
mod effect;
mod msg;
mod state;
mod update;
mod view_model;

pub use effect::Effect;
pub use msg::{ChangeOutcome, Classification, Msg, ACTIVATED_SUMMARY};
pub use state::{
    MonitoredResource, NewResource, NotificationSettings, ResourceId, ResourcePatch,
    ResourceStatus, ValidationError, NEVER,
};
pub use update::{notification_text, update};
pub use view_model::{resource_rows, ResourceRow};
