//! Bridge configuration

/// Process-level bridge configuration, fixed at attach time.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Number of worker lanes in the router pool.
    pub workers: usize,
    /// Optional log level override (`trace`..`error`); `RUST_LOG` wins.
    pub log_level: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            log_level: None,
        }
    }
}

impl BridgeConfig {
    /// Build a configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    ///
    /// - `OBJBRIDGE_WORKERS`: worker lane count (minimum 1)
    /// - `OBJBRIDGE_LOG_LEVEL`: log level override
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let workers = std::env::var("OBJBRIDGE_WORKERS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .map(|n| n.max(1))
            .unwrap_or(defaults.workers);

        let log_level = std::env::var("OBJBRIDGE_LOG_LEVEL").ok();

        Self { workers, log_level }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.workers, 2);
        assert!(cfg.log_level.is_none());
    }
}
