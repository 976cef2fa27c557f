//! Configuration validation

use super::*;
use anyhow::Result;

/// Largest vector dimension accepted
pub const MAX_VECTOR_LENGTH: usize = 8192;

/// Validate complete configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_workload(&config.workload)?;
    validate_phases(&config.phases)?;
    validate_container(&config.container)?;

    // Injected failures would make the read-back validation fail by design
    if config.container.backend.fail_every.is_some() && !config.runtime.skip_validation {
        anyhow::bail!("fail_every requires skip_validation");
    }

    Ok(())
}

/// Validate workload configuration
pub fn validate_workload(workload: &WorkloadConfig) -> Result<()> {
    if workload.agents == 0 {
        anyhow::bail!("agents must be at least 1");
    }
    if workload.rate == 0 {
        anyhow::bail!("rate must be at least 1");
    }
    if workload.batch_size == 0 {
        anyhow::bail!("batch_size must be at least 1");
    }
    if workload.vector_length > MAX_VECTOR_LENGTH {
        anyhow::bail!(
            "vector_length must be at most {}, got {}",
            MAX_VECTOR_LENGTH,
            workload.vector_length
        );
    }
    Ok(())
}

/// Validate phase timing
pub fn validate_phases(phases: &PhaseConfig) -> Result<()> {
    let fraction = phases.warmup_rate_fraction;
    if !(fraction > 0.0 && fraction <= 1.0) {
        anyhow::bail!("warmup_rate_fraction must be in (0, 1], got {}", fraction);
    }
    if phases.test_secs == 0 {
        anyhow::bail!("test duration must be at least 1 second");
    }
    Ok(())
}

/// Validate container settings
pub fn validate_container(container: &ContainerConfig) -> Result<()> {
    if container.name.trim().is_empty() {
        anyhow::bail!("container name must not be empty");
    }
    if container.backend.max_batch == 0 {
        anyhow::bail!("max_batch must be at least 1");
    }
    if container.backend.fail_every == Some(0) {
        anyhow::bail!("fail_every must be at least 1");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_workload_rejections() {
        let mut config = Config::default();
        config.workload.agents = 0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.workload.rate = 0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.workload.batch_size = 0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.workload.vector_length = MAX_VECTOR_LENGTH + 1;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_phase_rejections() {
        for fraction in [0.0, -0.5, 1.01] {
            let mut config = Config::default();
            config.phases.warmup_rate_fraction = fraction;
            assert!(validate_config(&config).is_err(), "fraction {}", fraction);
        }

        let mut config = Config::default();
        config.phases.test_secs = 0;
        assert!(validate_config(&config).is_err());

        // A zero warm-up just skips that phase
        let mut config = Config::default();
        config.phases.warmup_secs = 0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_container_rejections() {
        let mut config = Config::default();
        config.container.backend.max_batch = 0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.container.name = "  ".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_fail_every_requires_skip_validation() {
        let mut config = Config::default();
        config.container.backend.fail_every = Some(10);
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("skip_validation"));

        config.runtime.skip_validation = true;
        assert!(validate_config(&config).is_ok());

        config.container.backend.fail_every = Some(0);
        assert!(validate_config(&config).is_err());
    }
}
