//! OpenCL devices

use std::fmt;
use std::sync::Arc;

use crate::driver::{DeviceInfo, Driver, RawDevice, RawPlatform};
use crate::error::Result;
use crate::platform::Platform;
use crate::types::DeviceType;

/// A root device. Root devices are not reference counted, so `Clone` is cheap.
#[derive(Clone)]
pub struct Device {
    driver: Arc<dyn Driver>,
    raw: RawDevice,
}

impl Device {
    pub(crate) fn from_raw(driver: Arc<dyn Driver>, raw: RawDevice) -> Self {
        Self { driver, raw }
    }

    pub fn raw(&self) -> RawDevice {
        self.raw
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    fn info(&self, param: DeviceInfo) -> Result<crate::driver::InfoValue> {
        self.driver.device_info(self.raw, param)
    }

    pub fn name(&self) -> Result<String> {
        self.info(DeviceInfo::Name)?.into_text(DeviceInfo::Name.label())
    }

    pub fn vendor(&self) -> Result<String> {
        self.info(DeviceInfo::Vendor)?.into_text(DeviceInfo::Vendor.label())
    }

    pub fn vendor_id(&self) -> Result<u32> {
        self.info(DeviceInfo::VendorId)?.into_uint(DeviceInfo::VendorId.label())
    }

    pub fn version(&self) -> Result<String> {
        self.info(DeviceInfo::Version)?.into_text(DeviceInfo::Version.label())
    }

    pub fn driver_version(&self) -> Result<String> {
        self.info(DeviceInfo::DriverVersion)?
            .into_text(DeviceInfo::DriverVersion.label())
    }

    pub fn profile(&self) -> Result<String> {
        self.info(DeviceInfo::Profile)?.into_text(DeviceInfo::Profile.label())
    }

    pub fn device_type(&self) -> Result<DeviceType> {
        let bits = self.info(DeviceInfo::Type)?.into_bitfield(DeviceInfo::Type.label())?;
        Ok(DeviceType::from_bits(bits))
    }

    pub fn max_compute_units(&self) -> Result<u32> {
        self.info(DeviceInfo::MaxComputeUnits)?
            .into_uint(DeviceInfo::MaxComputeUnits.label())
    }

    pub fn max_clock_frequency(&self) -> Result<u32> {
        self.info(DeviceInfo::MaxClockFrequency)?
            .into_uint(DeviceInfo::MaxClockFrequency.label())
    }

    pub fn max_work_group_size(&self) -> Result<usize> {
        self.info(DeviceInfo::MaxWorkGroupSize)?
            .into_size(DeviceInfo::MaxWorkGroupSize.label())
    }

    pub fn max_work_item_dimensions(&self) -> Result<u32> {
        self.info(DeviceInfo::MaxWorkItemDimensions)?
            .into_uint(DeviceInfo::MaxWorkItemDimensions.label())
    }

    /// Per-dimension work-item limits; the length is `max_work_item_dimensions`.
    pub fn max_work_item_sizes(&self) -> Result<Vec<usize>> {
        self.info(DeviceInfo::MaxWorkItemSizes)?
            .into_sizes(DeviceInfo::MaxWorkItemSizes.label())
    }

    pub fn global_mem_size(&self) -> Result<u64> {
        self.info(DeviceInfo::GlobalMemSize)?
            .into_ulong(DeviceInfo::GlobalMemSize.label())
    }

    pub fn local_mem_size(&self) -> Result<u64> {
        self.info(DeviceInfo::LocalMemSize)?
            .into_ulong(DeviceInfo::LocalMemSize.label())
    }

    pub fn max_mem_alloc_size(&self) -> Result<u64> {
        self.info(DeviceInfo::MaxMemAllocSize)?
            .into_ulong(DeviceInfo::MaxMemAllocSize.label())
    }

    pub fn is_available(&self) -> Result<bool> {
        self.info(DeviceInfo::Available)?
            .into_bool(DeviceInfo::Available.label())
    }

    pub fn compiler_available(&self) -> Result<bool> {
        self.info(DeviceInfo::CompilerAvailable)?
            .into_bool(DeviceInfo::CompilerAvailable.label())
    }

    pub fn image_support(&self) -> Result<bool> {
        self.info(DeviceInfo::ImageSupport)?
            .into_bool(DeviceInfo::ImageSupport.label())
    }

    pub fn extensions(&self) -> Result<Vec<String>> {
        Ok(self
            .info(DeviceInfo::Extensions)?
            .into_text(DeviceInfo::Extensions.label())?
            .split_whitespace()
            .map(str::to_string)
            .collect())
    }

    pub fn platform(&self) -> Result<Platform> {
        let raw = self.info(DeviceInfo::Platform)?
            .into_handle(DeviceInfo::Platform.label())?;
        Ok(Platform::from_raw(
            Arc::clone(&self.driver),
            RawPlatform::from_raw(raw),
        ))
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device").field("raw", &self.raw).finish()
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Device {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{SimDeviceSpec, SimDriver};

    fn devices(specs: Vec<SimDeviceSpec>) -> Vec<Device> {
        let driver: Arc<dyn Driver> = Arc::new(SimDriver::with_devices(specs));
        Platform::default(&driver)
            .unwrap()
            .devices(DeviceType::ALL)
            .unwrap()
    }

    #[test]
    fn test_device_queries() {
        let spec = SimDeviceSpec::gpu("Test GPU").with_max_work_group_size(256);
        let device = devices(vec![spec.clone()]).remove(0);

        assert_eq!(device.name().unwrap(), "Test GPU");
        assert_eq!(device.device_type().unwrap(), DeviceType::GPU);
        assert_eq!(device.max_work_group_size().unwrap(), 256);
        assert_eq!(device.max_work_item_dimensions().unwrap(), 3);
        assert_eq!(
            device.max_work_item_sizes().unwrap(),
            spec.max_work_item_sizes.to_vec()
        );
        assert_eq!(device.global_mem_size().unwrap(), spec.global_mem_size);
        assert_eq!(device.local_mem_size().unwrap(), spec.local_mem_size);
        assert_eq!(device.max_compute_units().unwrap(), spec.max_compute_units);
        assert!(device.is_available().unwrap());
        assert!(device.image_support().unwrap());
        assert!(device.extensions().unwrap().contains(&"cl_khr_fp64".to_string()));
    }

    #[test]
    fn test_device_platform_round_trip() {
        let device = devices(vec![SimDeviceSpec::cpu("cpu")]).remove(0);
        let platform = device.platform().unwrap();
        assert_eq!(platform.devices(DeviceType::CPU).unwrap(), vec![device]);
    }

    #[test]
    fn test_unavailable_device_is_reported() {
        let device = devices(vec![SimDeviceSpec::gpu("off").with_available(false)]).remove(0);
        assert!(!device.is_available().unwrap());
    }
}
