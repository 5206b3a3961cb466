use crate::storage::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of resident pages.
pub const DEFAULT_CAPACITY: usize = 50;

/// Default lock wait before a transaction is aborted, in milliseconds.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 100;

/// Buffer pool settings, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferPoolConfig {
    /// Maximum number of resident pages.
    pub capacity: usize,
    pub lock_timeout_ms: u64,
}

impl BufferPoolConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn validate(&self) -> StorageResult<()> {
        if self.capacity == 0 {
            return Err(StorageError::invalid(
                "Buffer pool capacity must be at least one page",
            ));
        }
        Ok(())
    }
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BufferPoolConfig::default();
        assert_eq!(config.capacity, 50);
        assert_eq!(config.lock_timeout(), Duration::from_millis(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_is_invalid() {
        let config = BufferPoolConfig {
            capacity: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(StorageError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_bincode_encoding() {
        let config = BufferPoolConfig {
            capacity: 8,
            lock_timeout_ms: 250,
        };
        let bytes = bincode::serialize(&config).unwrap();
        let decoded: BufferPoolConfig = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, config);
    }
}
