use crate::config::{parse_flag, ConfigError, ConfigSource, ConfigValidator, DepthValidator};
use std::collections::HashMap;
use std::env;

pub const ENV_MAX_RESOLUTION_DEPTH: &str = "TESSERA_MAX_RESOLUTION_DEPTH";
pub const ENV_INITIALIZE_ON_BUILD: &str = "TESSERA_INITIALIZE_ON_BUILD";
pub const ENV_TRACE_RESOLUTIONS: &str = "TESSERA_TRACE_RESOLUTIONS";

const DEFAULT_MAX_RESOLUTION_DEPTH: usize = 128;

/// Container runtime configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerConfig {
    /// Upper bound on the length of any single resolution stack
    pub max_resolution_depth: usize,
    /// Resolve `initialize_immediately` definitions when the container is built
    pub initialize_on_build: bool,
    /// Emit a debug event for every instantiation
    pub trace_resolutions: bool,
}

impl ContainerConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self {
            max_resolution_depth: DEFAULT_MAX_RESOLUTION_DEPTH,
            initialize_on_build: false,
            trace_resolutions: false,
        }
    }

    /// Create configuration for development
    pub fn development() -> Self {
        Self {
            trace_resolutions: true,
            ..Self::new()
        }
    }

    /// Create configuration for testing
    pub fn testing() -> Self {
        Self {
            max_resolution_depth: 32,
            ..Self::new()
        }
    }

    /// Create configuration for production
    pub fn production() -> Self {
        Self {
            initialize_on_build: true,
            ..Self::new()
        }
    }

    pub fn with_max_resolution_depth(mut self, depth: usize) -> Self {
        self.max_resolution_depth = depth;
        self
    }

    pub fn with_initialize_on_build(mut self, enabled: bool) -> Self {
        self.initialize_on_build = enabled;
        self
    }

    pub fn with_trace_resolutions(mut self, enabled: bool) -> Self {
        self.trace_resolutions = enabled;
        self
    }

    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::new();

        if let Some(depth_str) = read_env(ENV_MAX_RESOLUTION_DEPTH)? {
            config.max_resolution_depth =
                depth_str.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    field: "max_resolution_depth".to_string(),
                    value: depth_str.clone(),
                    expected: "positive integer".to_string(),
                })?;
        }

        if let Some(flag) = read_env(ENV_INITIALIZE_ON_BUILD)? {
            config.initialize_on_build = parse_flag("initialize_on_build", &flag)?;
        }

        if let Some(flag) = read_env(ENV_TRACE_RESOLUTIONS)? {
            config.trace_resolutions = parse_flag("trace_resolutions", &flag)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        DepthValidator::default().validate(&self.max_resolution_depth)
    }

    /// Get configuration source information for debugging
    pub fn config_sources(&self) -> HashMap<String, ConfigSource> {
        let source = |var: &str, default: String| {
            if env::var(var).is_ok() {
                ConfigSource::EnvVar(var.to_string())
            } else {
                ConfigSource::Default(default)
            }
        };

        let mut sources = HashMap::new();
        sources.insert(
            "max_resolution_depth".to_string(),
            source(
                ENV_MAX_RESOLUTION_DEPTH,
                DEFAULT_MAX_RESOLUTION_DEPTH.to_string(),
            ),
        );
        sources.insert(
            "initialize_on_build".to_string(),
            source(ENV_INITIALIZE_ON_BUILD, "false".to_string()),
        );
        sources.insert(
            "trace_resolutions".to_string(),
            source(ENV_TRACE_RESOLUTIONS, "false".to_string()),
        );
        sources
    }
}

fn read_env(var: &str) -> Result<Option<String>, ConfigError> {
    match env::var(var) {
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::environment_error(format!(
            "{} is not valid unicode",
            var
        ))),
    }
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self::new()
    }
}
