//! OpenCL contexts

use std::sync::Arc;

use crate::device::Device;
use crate::driver::{ContextInfo, Driver, RawContext, RawDevice};
use crate::error::{ClError, Result};
use crate::handle::{ContextKind, Handle};
use crate::platform::Platform;

/// A context over one or more devices. `Clone` retains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    handle: Handle<ContextKind>,
    devices: Vec<Device>,
}

impl Context {
    /// Creates a context spanning `devices`.
    pub fn new(devices: &[Device]) -> Result<Self> {
        let Some(first) = devices.first() else {
            return Err(ClError::InvalidArgument(
                "a context needs at least one device".into(),
            ));
        };
        let driver = Arc::clone(first.driver());
        let raw_devices: Vec<RawDevice> = devices.iter().map(Device::raw).collect();
        let raw = driver.create_context(&raw_devices)?;
        log::debug!("Created context {:?} over {} device(s)", raw, devices.len());
        Self::from_handle(Handle::from_owned(driver, raw))
    }

    pub fn from_device(device: &Device) -> Result<Self> {
        Self::new(std::slice::from_ref(device))
    }

    /// Wraps a context reference returned by a query (retains it).
    pub(crate) fn retained(driver: Arc<dyn Driver>, raw: RawContext) -> Result<Self> {
        Self::from_handle(Handle::retained(driver, raw)?)
    }

    fn from_handle(handle: Handle<ContextKind>) -> Result<Self> {
        let devices = handle
            .driver()
            .context_info(handle.raw(), ContextInfo::Devices)?
            .into_handles(ContextInfo::Devices.label())?
            .into_iter()
            .map(|raw| Device::from_raw(Arc::clone(handle.driver()), RawDevice::from_raw(raw)))
            .collect();
        Ok(Self { handle, devices })
    }

    pub fn raw(&self) -> RawContext {
        self.handle.raw()
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        self.handle.driver()
    }

    /// Devices of the context, as read when it was created.
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn num_devices(&self) -> Result<u32> {
        self.driver()
            .context_info(self.raw(), ContextInfo::NumDevices)?
            .into_uint(ContextInfo::NumDevices.label())
    }

    pub fn reference_count(&self) -> Result<u32> {
        self.driver()
            .context_info(self.raw(), ContextInfo::ReferenceCount)?
            .into_uint(ContextInfo::ReferenceCount.label())
    }

    /// Platform of the context's first device.
    pub fn platform(&self) -> Result<Platform> {
        match self.devices.first() {
            Some(device) => device.platform(),
            None => Err(ClError::NoPlatform),
        }
    }

    /// Releases the context's reference now.
    pub fn release(self) -> Result<()> {
        self.handle.release()
    }
}
