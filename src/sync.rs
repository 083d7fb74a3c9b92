//! Sync flows that drive the paginator, normalizer and store for each
//! ecosystem.

pub mod batch;
pub mod channels;
pub mod messages;

pub use batch::BatchBuffer;
pub use channels::{ChannelSync, ChannelSyncReport, EcosystemChannels};
pub use messages::{MessageSync, MessageSyncOptions, MessageSyncReport, StopReason, SyncMode};
