// churnpool - pooled object allocators for churn workloads
// Fixed-type heap management with chunk pools and slab heaps

#![warn(rust_2018_idioms)]

pub mod config;
pub mod pool;
mod raw;
pub mod slab;
pub mod workload;

// Re-exports for convenience
pub use config::{AllocConfig, PoolConfig, SlabConfig};
pub use pool::{ChunkPool, PoolHandle, PoolPtr, PoolStats};
pub use slab::{Cursor, SharedSlabHeap, SlabAllocator, SlabHandle, SlabHeap, SlotId};

/// churnpool error types
pub mod error {
    use thiserror::Error;

    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum Error {
        #[error("Invalid configuration: {0}")]
        InvalidConfig(String),

        #[error("Object of {size} bytes does not fit in a {capacity}-byte region")]
        ObjectTooLarge { size: usize, capacity: usize },

        #[error("Zero-sized type cannot be pooled: {0}")]
        ZeroSized(&'static str),

        #[error("Config error: {0}")]
        Config(String),
    }

    pub type Result<T> = std::result::Result<T, Error>;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_format() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_error_display() {
        let err = error::Error::ObjectTooLarge {
            size: 9000,
            capacity: 8168,
        };
        assert_eq!(
            err.to_string(),
            "Object of 9000 bytes does not fit in a 8168-byte region"
        );
    }
}
