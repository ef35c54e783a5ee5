//! Project ID pool errors

use thiserror::Error;

/// Result type for pool operations
pub type PoolResult<T> = Result<T, PoolError>;

/// Project ID pool errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("no available project ID in range [{min}, {max}]")]
    Exhausted { min: u32, max: u32 },

    #[error("project ID {id} is outside the configured range [{min}, {max}]")]
    OutOfRange { id: u32, min: u32, max: u32 },

    #[error("invalid project ID range: min={min}, max={max}")]
    InvalidRange { min: u32, max: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_message_names_range() {
        let err = PoolError::Exhausted { min: 10, max: 20 };
        assert_eq!(err.to_string(), "no available project ID in range [10, 20]");
    }
}
