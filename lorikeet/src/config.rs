use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_USER_MAILBOX_CAPACITY: usize = 1024;
pub const DEFAULT_SYSTEM_MAILBOX_CAPACITY: usize = 64;
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

// --- Node Configuration ---

/// Configuration for a `Node`, supplying defaults for every process it spawns.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Default capacity of a process's user channel.
    pub user_mailbox_capacity: usize,

    /// Default capacity of a process's system channel.
    pub system_mailbox_capacity: usize,

    /// How long a terminating process waits on each peer it notifies.
    pub notify_timeout: Duration,

    /// How long node shutdown and supervisor-driven child termination wait
    /// before giving up on a process.
    pub shutdown_timeout: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            user_mailbox_capacity: DEFAULT_USER_MAILBOX_CAPACITY,
            system_mailbox_capacity: DEFAULT_SYSTEM_MAILBOX_CAPACITY,
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl NodeConfig {
    /// Merge node configuration with process-specific configuration.
    /// Node defaults fill every field the process config leaves unset, and
    /// capacities are clamped to at least one slot.
    pub fn merge_with_process_config(&self, process_config: &ProcessConfig) -> ProcessConfig {
        ProcessConfig {
            user_mailbox_capacity: Some(
                process_config
                    .user_mailbox_capacity
                    .unwrap_or(self.user_mailbox_capacity)
                    .max(1),
            ),
            system_mailbox_capacity: Some(
                process_config
                    .system_mailbox_capacity
                    .unwrap_or(self.system_mailbox_capacity)
                    .max(1),
            ),
            notify_timeout: process_config.notify_timeout.or(Some(self.notify_timeout)),
        }
    }
}

// --- Process Configuration ---

/// Configuration for individual processes, potentially overriding node defaults.
#[derive(Clone, Debug, Default)]
pub struct ProcessConfig {
    pub user_mailbox_capacity: Option<usize>,
    pub system_mailbox_capacity: Option<usize>,
    pub notify_timeout: Option<Duration>,
}

impl ProcessConfig {
    pub(crate) fn user_capacity(&self) -> usize {
        self.user_mailbox_capacity.unwrap_or(DEFAULT_USER_MAILBOX_CAPACITY)
    }

    pub(crate) fn system_capacity(&self) -> usize {
        self.system_mailbox_capacity.unwrap_or(DEFAULT_SYSTEM_MAILBOX_CAPACITY)
    }

    pub(crate) fn notify_timeout(&self) -> Duration {
        self.notify_timeout.unwrap_or(DEFAULT_NOTIFY_TIMEOUT)
    }
}

/// Per-spawn options.
#[derive(Clone, Debug, Default)]
pub struct SpawnOptions {
    pub config: ProcessConfig,
    /// Parent token; the process runs under a child of it. Defaults to the
    /// node's root token.
    pub cancel: Option<CancellationToken>,
}

impl SpawnOptions {
    pub fn with_cancel(cancel: CancellationToken) -> Self {
        Self {
            cancel: Some(cancel),
            ..Default::default()
        }
    }

    pub fn config(mut self, config: ProcessConfig) -> Self {
        self.config = config;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_fills_unset_fields_from_node() {
        let node = NodeConfig {
            user_mailbox_capacity: 16,
            system_mailbox_capacity: 4,
            notify_timeout: Duration::from_millis(250),
            shutdown_timeout: Duration::from_secs(1),
        };
        let merged = node.merge_with_process_config(&ProcessConfig {
            user_mailbox_capacity: Some(2),
            ..Default::default()
        });

        assert_eq!(merged.user_capacity(), 2);
        assert_eq!(merged.system_capacity(), 4);
        assert_eq!(merged.notify_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn merge_clamps_zero_capacity() {
        let merged = NodeConfig::default().merge_with_process_config(&ProcessConfig {
            user_mailbox_capacity: Some(0),
            system_mailbox_capacity: Some(0),
            ..Default::default()
        });

        assert_eq!(merged.user_capacity(), 1);
        assert_eq!(merged.system_capacity(), 1);
    }
}
