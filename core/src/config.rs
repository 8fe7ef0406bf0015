//! Runtime configuration for the transfer core

/// Default upper bound for a single chunk read: 64KB
pub const DEFAULT_MAX_CHUNK_LEN: usize = 64 * 1024;

/// Default capacity of the notification queue
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Bounded queue size between the dispatcher and the presentation layer
    pub notification_capacity: usize,
    /// Chunk requests longer than this are served in part; 0 is treated as 1
    pub max_chunk_len: usize,
    /// Create missing parent directories for incoming files
    pub create_parent_dirs: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        TransferConfig {
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
            max_chunk_len: DEFAULT_MAX_CHUNK_LEN,
            create_parent_dirs: true,
        }
    }
}
