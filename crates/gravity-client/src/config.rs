use std::time::Duration;

/// Default deadline for `Client::get` when the caller does not pass one.
pub const DEFAULT_GET_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub get_timeout: Duration,
    /// Count at most one acknowledgment per node identity. Off by default:
    /// redelivered replies then inflate the count.
    pub dedupe_by_node: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            get_timeout: DEFAULT_GET_TIMEOUT,
            dedupe_by_node: false,
        }
    }
}
