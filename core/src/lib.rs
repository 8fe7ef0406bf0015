//! Chunkflow Core Library
//! Flow control for chunked peer-to-peer file transfers

pub mod config;
pub mod control;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod flow;
pub mod registry;
pub mod store;
pub mod transfer;

pub use config::TransferConfig;
pub use dispatcher::{CancelReason, Dispatcher, Indication, Notification};
pub use engine::{Control, Engine, EngineError, PeerId, TransferId, TransferKind};
pub use error::{TransferError, TransitionError};
pub use registry::TransferRegistry;
pub use store::{BackingStore, FileStore, Resource};
pub use transfer::{Direction, Transfer, TransferProgress, TransferState};

/// Initialize the core library logging
pub fn init() {
    // The host may already own a global subscriber; a second call is a no-op.
    let _ = tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(tracing::Level::INFO)
            .finish(),
    );

    tracing::info!("Chunkflow Core Initialized (logger ready)");
}
