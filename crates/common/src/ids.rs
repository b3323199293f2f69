//! Typed identifiers shared across authority/client/stream components.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical address of a node's block-storage service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockManagerId {
    /// Executor owning the block store.
    pub executor_id: String,
    /// Host the executor runs on.
    pub host: String,
    /// Block-service port on that host.
    pub port: u16,
}

impl BlockManagerId {
    /// Build an address from its parts.
    pub fn new(
        executor_id: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            executor_id: executor_id.into(),
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for BlockManagerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.executor_id, self.host, self.port)
    }
}

/// Identifier of one map output partition block within a shuffle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShuffleBlockId {
    /// Shuffle the block belongs to.
    pub shuffle_id: i32,
    /// Map partition that produced the block.
    pub map_id: i32,
    /// Reduce partition the block is destined for.
    pub reduce_id: i32,
}

impl ShuffleBlockId {
    /// Build a block id from its coordinates.
    pub fn new(shuffle_id: i32, map_id: i32, reduce_id: i32) -> Self {
        Self {
            shuffle_id,
            map_id,
            reduce_id,
        }
    }
}

impl fmt::Display for ShuffleBlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "shuffle_{}_{}_{}",
            self.shuffle_id, self.map_id, self.reduce_id
        )
    }
}
