//! Configuration for cqrpc connections.

/// Default maximum message size (256 MiB).
///
/// Large enough for a 128 MiB payload plus header and metadata.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 256 * 1024 * 1024;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum accepted payload size in bytes.
    /// Default: 256 MiB
    pub max_message_size: usize,
    /// Set TCP_NODELAY on TCP connections.
    /// Default: true
    pub nodelay: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            nodelay: true,
        }
    }
}

impl Config {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum accepted payload size.
    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    /// Enable or disable TCP_NODELAY.
    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }
}
