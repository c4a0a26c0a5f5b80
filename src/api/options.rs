use std::convert::TryFrom;
use tokio::time::Duration;

#[derive(Clone, Default)]
pub struct ClusterOptions {
    /// Upper bound on a singleton instance's `pre_start()`.
    pub singleton_start_timeout: Option<Duration>,
    /// How long a stopping instance gets before it is aborted and a handoff fault is recorded.
    pub singleton_stop_grace_period: Option<Duration>,
    pub registry_queue_size: Option<usize>,
}

pub(super) struct ClusterOptionsValidated {
    pub singleton_start_timeout: Duration,
    pub singleton_stop_grace_period: Duration,
    pub registry_queue_size: usize,
}

impl ClusterOptionsValidated {
    fn validate(&self) -> Result<(), &'static str> {
        if self.singleton_start_timeout == Duration::from_secs(0) {
            return Err("Singleton start timeout must be greater than zero");
        }
        if self.singleton_stop_grace_period == Duration::from_secs(0) {
            return Err("Singleton stop grace period must be greater than zero");
        }
        if self.registry_queue_size == 0 {
            return Err("Registry queue size must be greater than zero");
        }

        Ok(())
    }
}

impl TryFrom<ClusterOptions> for ClusterOptionsValidated {
    type Error = &'static str;

    fn try_from(options: ClusterOptions) -> Result<Self, Self::Error> {
        let values = ClusterOptionsValidated {
            singleton_start_timeout: options.singleton_start_timeout.unwrap_or(Duration::from_secs(10)),
            singleton_stop_grace_period: options
                .singleton_stop_grace_period
                .unwrap_or(Duration::from_secs(5)),
            registry_queue_size: options.registry_queue_size.unwrap_or(32),
        };

        values.validate()?;
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_values() {
        let options = ClusterOptionsValidated::try_from(ClusterOptions {
            singleton_stop_grace_period: Some(Duration::from_millis(250)),
            ..ClusterOptions::default()
        })
        .unwrap();

        assert_eq!(options.singleton_start_timeout, Duration::from_secs(10));
        assert_eq!(options.singleton_stop_grace_period, Duration::from_millis(250));
        assert_eq!(options.registry_queue_size, 32);
    }

    #[test]
    fn zero_values_are_rejected() {
        let zero_grace = ClusterOptions {
            singleton_stop_grace_period: Some(Duration::from_secs(0)),
            ..ClusterOptions::default()
        };
        let zero_queue = ClusterOptions {
            registry_queue_size: Some(0),
            ..ClusterOptions::default()
        };

        assert!(ClusterOptionsValidated::try_from(zero_grace).is_err());
        assert!(ClusterOptionsValidated::try_from(zero_queue).is_err());
    }
}
