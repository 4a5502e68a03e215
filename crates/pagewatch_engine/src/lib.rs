//! PageWatch engine: fetching, extraction, change classification and the monitoring cycle.
mod classify;
mod decode;
mod extract;
mod fetch;
mod monitor;
mod notify;
mod persist;
mod store;
mod text;
mod types;

pub use classify::{
    truncate_chars, ChangeClassifier, ChangeJudge, HeuristicJudge, JudgeError,
    SNAPSHOT_PREFIX_CHARS,
};
pub use decode::{decode_html, DecodedHtml};
pub use extract::{ExtractedContent, ExtractionScope, Extractor, Locator, LocatorExtractor};
pub use fetch::{FetchSettings, Fetcher, ReqwestFetcher, DEFAULT_USER_AGENT};
pub use monitor::{
    CheckReport, Clock, Collaborators, CycleEntry, CycleReport, CycleRun, EntryResult,
    ExecutionMode, Monitor, MonitorConfig, MonitorError, SkipReason,
};
pub use notify::{NotificationTransport, NotifyError, TelegramTransport, TELEGRAM_API_BASE};
pub use persist::{ensure_data_dir, AtomicFileWriter, PersistError};
pub use store::{
    MemoryResourceStore, ResourceStore, ResourceTable, SettingsStore, StaticSettingsStore,
    StoreError,
};
pub use text::visible_lines;
pub use types::{FailureKind, FetchError, FetchMetadata, FetchOutput};
