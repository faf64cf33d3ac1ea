//! Runtime configuration.
//!
//! Read from the environment:
//! - `CLBIND_DRIVER`: `native` or `sim`
//! - `CLBIND_PLATFORM`: case-insensitive substring of the platform name
//! - `CLBIND_DEVICE_TYPE`: `gpu`, `cpu`, `accelerator`, `default`, `all` (`|`-joined)
//! - `CLBIND_DEVICE`: index among the matching devices
//! - `CLBIND_BUILD_OPTIONS`: appended to every program build

use std::str::FromStr;

use crate::error::{ClError, Result};
use crate::types::DeviceType;

pub const ENV_DRIVER: &str = "CLBIND_DRIVER";
pub const ENV_PLATFORM: &str = "CLBIND_PLATFORM";
pub const ENV_DEVICE_TYPE: &str = "CLBIND_DEVICE_TYPE";
pub const ENV_DEVICE: &str = "CLBIND_DEVICE";
pub const ENV_BUILD_OPTIONS: &str = "CLBIND_BUILD_OPTIONS";

/// Which [`Driver`](crate::driver::Driver) implementation to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverKind {
    /// System OpenCL ICD (requires the `opencl` feature).
    Native,
    /// In-process simulated driver.
    Sim,
}

impl Default for DriverKind {
    fn default() -> Self {
        if cfg!(feature = "opencl") {
            DriverKind::Native
        } else {
            DriverKind::Sim
        }
    }
}

impl FromStr for DriverKind {
    type Err = ClError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" | "opencl" | "icd" => Ok(DriverKind::Native),
            "sim" | "simulated" | "mock" => Ok(DriverKind::Sim),
            other => Err(ClError::Config(format!("unknown driver '{}'", other))),
        }
    }
}

/// Device selection and build settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClConfig {
    pub driver: DriverKind,
    /// Substring matched against platform names; `None` takes the first platform.
    pub platform: Option<String>,
    pub device_type: DeviceType,
    pub device_index: usize,
    /// Appended to the options of every [`Program::build`](crate::Program::build).
    pub build_options: String,
}

impl Default for ClConfig {
    fn default() -> Self {
        Self {
            driver: DriverKind::default(),
            platform: None,
            device_type: DeviceType::ALL,
            device_index: 0,
            build_options: String::new(),
        }
    }
}

impl ClConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the `CLBIND_*` variables from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(driver) = non_empty(ENV_DRIVER) {
            config.driver = driver.parse()?;
        }
        if let Some(platform) = non_empty(ENV_PLATFORM) {
            config.platform = Some(platform.trim().to_string());
        }
        if let Some(device_type) = non_empty(ENV_DEVICE_TYPE) {
            config.device_type = device_type.parse()?;
        }
        if let Some(index) = non_empty(ENV_DEVICE) {
            config.device_index = index.trim().parse().map_err(|_| {
                ClError::Config(format!("{} must be a device index, got '{}'", ENV_DEVICE, index))
            })?;
        }
        if let Some(options) = non_empty(ENV_BUILD_OPTIONS) {
            config.build_options = options.trim().to_string();
        }

        log::debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }

    pub fn with_driver(mut self, driver: DriverKind) -> Self {
        self.driver = driver;
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    pub fn with_device_type(mut self, device_type: DeviceType) -> Self {
        self.device_type = device_type;
        self
    }

    pub fn with_device_index(mut self, index: usize) -> Self {
        self.device_index = index;
        self
    }

    pub fn with_build_options(mut self, options: impl Into<String>) -> Self {
        self.build_options = options.into();
        self
    }

    /// Joins per-call options with the configured ones.
    pub fn merge_build_options(&self, options: &str) -> String {
        match (options.trim(), self.build_options.trim()) {
            ("", extra) => extra.to_string(),
            (own, "") => own.to_string(),
            (own, extra) => format!("{} {}", own, extra),
        }
    }

    /// Whether a platform name passes the configured filter.
    pub fn matches_platform(&self, name: &str) -> bool {
        match &self.platform {
            Some(filter) => name.to_lowercase().contains(&filter.to_lowercase()),
            None => true,
        }
    }
}
