//! Engine configuration.

use crate::error::Error;

/// Default number of decimal places kept on derived decimal attributes.
pub const DEFAULT_DECIMAL_SCALE: u32 = 2;

/// Smallest scale accepted; monetary attributes need at least cents.
pub const MIN_DECIMAL_SCALE: u32 = 2;

/// Largest scale accepted. Leaves 18 integer digits in a 96-bit mantissa.
pub const MAX_DECIMAL_SCALE: u32 = 10;

/// Default maximum depth for cascading deletes.
pub const DEFAULT_MAX_CASCADE_DEPTH: usize = 100;

/// Configuration for the propagation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Decimal places that sum and formula results are rounded to.
    pub decimal_scale: u32,

    /// Maximum depth of cascading deletes.
    pub max_cascade_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            decimal_scale: DEFAULT_DECIMAL_SCALE,
            max_cascade_depth: DEFAULT_MAX_CASCADE_DEPTH,
        }
    }
}

impl EngineConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the decimal scale.
    pub fn with_decimal_scale(mut self, scale: u32) -> Self {
        self.decimal_scale = scale;
        self
    }

    /// Set the maximum cascade depth.
    pub fn with_max_cascade_depth(mut self, depth: usize) -> Self {
        self.max_cascade_depth = depth;
        self
    }

    /// Check the configuration for out-of-range settings.
    pub fn validate(&self) -> Result<(), Error> {
        if !(MIN_DECIMAL_SCALE..=MAX_DECIMAL_SCALE).contains(&self.decimal_scale) {
            return Err(Error::Config(format!(
                "decimal scale {} outside {}..={}",
                self.decimal_scale, MIN_DECIMAL_SCALE, MAX_DECIMAL_SCALE
            )));
        }
        if self.max_cascade_depth == 0 {
            return Err(Error::Config("max cascade depth must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.decimal_scale, DEFAULT_DECIMAL_SCALE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_scale_bounds() {
        assert!(EngineConfig::new().with_decimal_scale(1).validate().is_err());
        assert!(EngineConfig::new().with_decimal_scale(4).validate().is_ok());
        assert!(EngineConfig::new().with_decimal_scale(10).validate().is_ok());
        assert!(EngineConfig::new().with_decimal_scale(11).validate().is_err());
        assert!(EngineConfig::new().with_decimal_scale(28).validate().is_err());
    }

    #[test]
    fn test_zero_cascade_depth_rejected() {
        let config = EngineConfig::new().with_max_cascade_depth(0);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
