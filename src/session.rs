//! Platform, device and context opened together from configuration.

use std::sync::Arc;

use crate::config::ClConfig;
use crate::context::Context;
use crate::device::Device;
use crate::driver::{self, Driver};
use crate::error::{ClError, Result};
use crate::platform::Platform;
use crate::program::Program;

/// A single-device context, selected the way [`ClConfig`] describes.
#[derive(Debug, Clone)]
pub struct Session {
    platform: Platform,
    device: Device,
    context: Context,
    config: ClConfig,
}

impl Session {
    /// Opens a session from the `CLBIND_*` environment variables.
    pub fn new() -> Result<Self> {
        Self::with_config(ClConfig::from_env()?)
    }

    pub fn with_config(config: ClConfig) -> Result<Self> {
        let driver = driver::open(&config)?;
        Self::with_driver(driver, config)
    }

    /// Opens a session on an already constructed driver; `config.driver` is
    /// ignored.
    pub fn with_driver(driver: Arc<dyn Driver>, config: ClConfig) -> Result<Self> {
        let platform = Self::select_platform(&driver, &config)?;

        let devices = platform.devices(config.device_type)?;
        if devices.is_empty() {
            return Err(ClError::NoDevice {
                device_type: config.device_type.to_string(),
            });
        }
        let device = devices.get(config.device_index).cloned().ok_or(ClError::DeviceIndex {
            index: config.device_index,
            available: devices.len(),
        })?;

        let context = Context::from_device(&device)?;
        log::debug!(
            "Opened session on '{}' ({}) via {} driver",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            platform.name().unwrap_or_else(|_| "Unknown".to_string()),
            driver.name()
        );

        Ok(Self {
            platform,
            device,
            context,
            config,
        })
    }

    fn select_platform(driver: &Arc<dyn Driver>, config: &ClConfig) -> Result<Platform> {
        for platform in Platform::list(driver)? {
            if config.matches_platform(&platform.name()?) {
                return Ok(platform);
            }
        }
        Err(ClError::NoPlatform)
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn config(&self) -> &ClConfig {
        &self.config
    }

    /// Get the device name
    pub fn device_name(&self) -> String {
        self.device.name().unwrap_or_else(|_| "Unknown".to_string())
    }

    /// Creates and builds a program with the configured build options.
    pub fn build_program(&self, source: &str) -> Result<Program> {
        self.build_program_with_options(source, "")
    }

    /// Like [`build_program`](Self::build_program); `options` come before the
    /// configured ones.
    pub fn build_program_with_options(&self, source: &str, options: &str) -> Result<Program> {
        let program = Program::with_source(&self.context, source)?;
        program.build(None, &self.config.merge_build_options(options))?;
        Ok(program)
    }
}
