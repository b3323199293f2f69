use serde::{Deserialize, Serialize};

use crate::error::{FshError, Result};

/// Map-output tracking configuration shared by authority and client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Serialized-catalog size at which replies switch to broadcast delivery.
    #[serde(default = "default_min_broadcast_size_bytes")]
    pub min_broadcast_size_bytes: usize,
    /// Hard ceiling for a single RPC reply payload.
    #[serde(default = "default_max_rpc_message_size_bytes")]
    pub max_rpc_message_size_bytes: usize,
    /// Whether reducer placement consults map-output locality hints.
    #[serde(default = "default_shuffle_locality_enabled")]
    pub shuffle_locality_enabled: bool,
    /// `num_maps * num_reducers` product above which statistics aggregation
    /// fans out across threads.
    #[serde(default = "default_parallel_aggregation_threshold")]
    pub parallel_aggregation_threshold: u64,
    /// Fixed number of dispatcher threads serving catalog fetch requests.
    #[serde(default = "default_dispatcher_threads")]
    pub dispatcher_threads: usize,
}

fn default_min_broadcast_size_bytes() -> usize {
    512 * 1024
}

fn default_max_rpc_message_size_bytes() -> usize {
    128 * 1024 * 1024
}

fn default_shuffle_locality_enabled() -> bool {
    true
}

fn default_parallel_aggregation_threshold() -> u64 {
    10_000_000
}

fn default_dispatcher_threads() -> usize {
    8
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_broadcast_size_bytes: default_min_broadcast_size_bytes(),
            max_rpc_message_size_bytes: default_max_rpc_message_size_bytes(),
            shuffle_locality_enabled: default_shuffle_locality_enabled(),
            parallel_aggregation_threshold: default_parallel_aggregation_threshold(),
            dispatcher_threads: default_dispatcher_threads(),
        }
    }
}

impl TrackerConfig {
    /// Reject configurations the runtime cannot honor.
    ///
    /// A broadcast threshold above the RPC ceiling would make every
    /// oversized catalog reply unsendable in both delivery forms.
    pub fn validate(&self) -> Result<()> {
        if self.min_broadcast_size_bytes > self.max_rpc_message_size_bytes {
            return Err(FshError::InvalidConfig(format!(
                "min_broadcast_size_bytes ({}) must not exceed max_rpc_message_size_bytes ({})",
                self.min_broadcast_size_bytes, self.max_rpc_message_size_bytes
            )));
        }
        if self.dispatcher_threads == 0 {
            return Err(FshError::InvalidConfig(
                "dispatcher_threads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        TrackerConfig::default().validate().expect("default config");
    }

    #[test]
    fn broadcast_threshold_above_rpc_ceiling_is_rejected() {
        let config = TrackerConfig {
            min_broadcast_size_bytes: 256,
            max_rpc_message_size_bytes: 128,
            ..TrackerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(FshError::InvalidConfig(_))
        ));
    }

    #[test]
    fn zero_dispatcher_threads_is_rejected() {
        let config = TrackerConfig {
            dispatcher_threads: 0,
            ..TrackerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(FshError::InvalidConfig(_))
        ));
    }
}
