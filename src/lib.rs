pub mod http;
pub mod normalize;
pub mod records;
pub mod runtime;
pub mod source;
pub mod store;
pub mod sync;

pub use http::{ApiClient, ApiMetricsSnapshot, FetchError, FetchPolicy, RateLimiter};
pub use normalize::{normalize_channel, normalize_message, RelayDirection};
pub use records::{ChannelRecord, Ecosystem, MessageRecord, NaturalKey};
pub use runtime::config::{MirrorConfig, MirrorConfigBuilder};
pub use runtime::runner::{EcosystemFailure, RunSummary, Runner};
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use source::{ChannelSource, CursorPaginator, PagePosition, PageRequest, PageSource, SubscanApi};
pub use store::{MemoryStore, MirrorStore, PgStore};
pub use sync::{
    ChannelSync, ChannelSyncReport, MessageSync, MessageSyncOptions, MessageSyncReport, StopReason,
    SyncMode,
};
