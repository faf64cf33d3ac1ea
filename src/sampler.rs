//! Sampler objects

use std::sync::Arc;

use crate::context::Context;
use crate::driver::{Driver, RawSampler, SamplerInfo};
use crate::error::{ClError, Result};
use crate::handle::{Handle, SamplerKind};
use crate::types::{AddressingMode, FilterMode, SamplerDesc};

/// `Clone` retains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sampler {
    handle: Handle<SamplerKind>,
    context: Context,
}

impl Sampler {
    pub fn create(context: &Context, desc: SamplerDesc) -> Result<Self> {
        let driver = Arc::clone(context.driver());
        let raw = driver.create_sampler(context.raw(), desc)?;
        log::debug!("Created sampler {:?} ({:?})", raw, desc);
        Ok(Self {
            handle: Handle::from_owned(driver, raw),
            context: context.clone(),
        })
    }

    pub fn raw(&self) -> RawSampler {
        self.handle.raw()
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        self.handle.driver()
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    fn uint(&self, param: SamplerInfo) -> Result<u32> {
        self.driver()
            .sampler_info(self.raw(), param)?
            .into_uint(param.label())
    }

    pub fn normalized_coords(&self) -> Result<bool> {
        self.driver()
            .sampler_info(self.raw(), SamplerInfo::NormalizedCoords)?
            .into_bool(SamplerInfo::NormalizedCoords.label())
    }

    pub fn addressing_mode(&self) -> Result<AddressingMode> {
        let param = SamplerInfo::AddressingMode;
        AddressingMode::from_code(self.uint(param)?).ok_or(ClError::UnexpectedInfo {
            param: param.label(),
            expected: "cl_addressing_mode",
        })
    }

    pub fn filter_mode(&self) -> Result<FilterMode> {
        let param = SamplerInfo::FilterMode;
        FilterMode::from_code(self.uint(param)?).ok_or(ClError::UnexpectedInfo {
            param: param.label(),
            expected: "cl_filter_mode",
        })
    }

    /// The full descriptor, read back from the driver.
    pub fn desc(&self) -> Result<SamplerDesc> {
        Ok(SamplerDesc::new(
            self.normalized_coords()?,
            self.addressing_mode()?,
            self.filter_mode()?,
        ))
    }

    pub fn reference_count(&self) -> Result<u32> {
        self.uint(SamplerInfo::ReferenceCount)
    }

    pub fn release(self) -> Result<()> {
        self.handle.release()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::SimDriver;
    use crate::error::Status;
    use crate::platform::Platform;
    use crate::types::DeviceType;

    fn context(device_type: DeviceType) -> Context {
        let driver: Arc<dyn Driver> = Arc::new(SimDriver::new());
        let devices = Platform::default(&driver)
            .unwrap()
            .devices(device_type)
            .unwrap();
        Context::new(&devices).unwrap()
    }

    #[test]
    fn test_descriptor_round_trip() {
        let context = context(DeviceType::GPU);
        let desc = SamplerDesc::new(true, AddressingMode::Repeat, FilterMode::Linear);
        let sampler = Sampler::create(&context, desc).unwrap();
        assert_eq!(sampler.desc().unwrap(), desc);
        assert_eq!(sampler.reference_count().unwrap(), 1);
        assert_eq!(sampler.context(), &context);
    }

    #[test]
    fn test_defaults() {
        let sampler = Sampler::create(&context(DeviceType::GPU), SamplerDesc::default()).unwrap();
        assert!(!sampler.normalized_coords().unwrap());
        assert_eq!(sampler.addressing_mode().unwrap(), AddressingMode::ClampToEdge);
        assert_eq!(sampler.filter_mode().unwrap(), FilterMode::Nearest);
    }

    #[test]
    fn test_requires_image_support() {
        let err = Sampler::create(&context(DeviceType::CPU), SamplerDesc::default()).unwrap_err();
        assert_eq!(err.status(), Some(Status::InvalidOperation));
    }
}
