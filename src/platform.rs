//! OpenCL platforms

use std::fmt;
use std::sync::Arc;

use crate::device::Device;
use crate::driver::{Driver, PlatformInfo, RawPlatform};
use crate::error::{ClError, Result, Status};
use crate::types::DeviceType;

/// An OpenCL platform. Platforms are not reference counted.
#[derive(Clone)]
pub struct Platform {
    driver: Arc<dyn Driver>,
    raw: RawPlatform,
}

impl Platform {
    pub(crate) fn from_raw(driver: Arc<dyn Driver>, raw: RawPlatform) -> Self {
        Self { driver, raw }
    }

    /// List all platforms the driver exposes
    pub fn list(driver: &Arc<dyn Driver>) -> Result<Vec<Platform>> {
        let ids = driver.platform_ids()?;
        Ok(ids
            .into_iter()
            .map(|raw| Self::from_raw(Arc::clone(driver), raw))
            .collect())
    }

    /// The first platform
    pub fn default(driver: &Arc<dyn Driver>) -> Result<Platform> {
        Self::list(driver)?.into_iter().next().ok_or(ClError::NoPlatform)
    }

    pub fn raw(&self) -> RawPlatform {
        self.raw
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    fn text(&self, param: PlatformInfo) -> Result<String> {
        self.driver
            .platform_info(self.raw, param)?
            .into_text(param.label())
    }

    pub fn name(&self) -> Result<String> {
        self.text(PlatformInfo::Name)
    }

    pub fn vendor(&self) -> Result<String> {
        self.text(PlatformInfo::Vendor)
    }

    pub fn version(&self) -> Result<String> {
        self.text(PlatformInfo::Version)
    }

    pub fn profile(&self) -> Result<String> {
        self.text(PlatformInfo::Profile)
    }

    pub fn extensions(&self) -> Result<Vec<String>> {
        Ok(self
            .text(PlatformInfo::Extensions)?
            .split_whitespace()
            .map(str::to_string)
            .collect())
    }

    /// Devices of the given type. No matching device is an empty list, not an
    /// error.
    pub fn devices(&self, device_type: DeviceType) -> Result<Vec<Device>> {
        let ids = match self.driver.device_ids(self.raw, device_type) {
            Ok(ids) => ids,
            Err(e) if e.status() == Some(Status::DeviceNotFound) => Vec::new(),
            Err(e) => return Err(e),
        };
        Ok(ids
            .into_iter()
            .map(|raw| Device::from_raw(Arc::clone(&self.driver), raw))
            .collect())
    }
}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Platform").field("raw", &self.raw).finish()
    }
}

impl PartialEq for Platform {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Platform {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{SimDeviceSpec, SimDriver};

    fn driver() -> Arc<dyn Driver> {
        Arc::new(SimDriver::new())
    }

    #[test]
    fn test_platform_queries() {
        let platform = Platform::default(&driver()).unwrap();
        assert!(platform.name().unwrap().contains("Simulated"));
        assert_eq!(platform.profile().unwrap(), "FULL_PROFILE");
        assert!(platform.version().unwrap().starts_with("OpenCL"));
        assert_eq!(platform.extensions().unwrap(), vec!["cl_khr_icd"]);
    }

    #[test]
    fn test_devices_by_type() {
        let platform = Platform::default(&driver()).unwrap();
        assert_eq!(platform.devices(DeviceType::ALL).unwrap().len(), 2);
        assert_eq!(platform.devices(DeviceType::GPU).unwrap().len(), 1);
        assert!(platform.devices(DeviceType::ACCELERATOR).unwrap().is_empty());
    }

    #[test]
    fn test_no_devices_configured() {
        let driver: Arc<dyn Driver> = Arc::new(SimDriver::with_devices(Vec::<SimDeviceSpec>::new()));
        let platform = Platform::default(&driver).unwrap();
        assert!(platform.devices(DeviceType::ALL).unwrap().is_empty());
    }
}
