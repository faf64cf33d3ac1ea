//! Buffer objects

use std::sync::Arc;

use bytemuck::Pod;

use crate::context::Context;
use crate::driver::{Driver, MemInfo, RawMem};
use crate::error::{ClError, Result};
use crate::handle::{Handle, MemKind};
use crate::types::{MemFlags, MemObjectType};

/// A device buffer. `Clone` retains the same memory object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buffer {
    handle: Handle<MemKind>,
    context: Context,
}

impl Buffer {
    /// Allocates `size` bytes.
    pub fn create(context: &Context, flags: MemFlags, size: usize) -> Result<Self> {
        Self::check_flags(flags)?;
        if flags.takes_host_data() {
            return Err(ClError::InvalidArgument(
                "COPY_HOST_PTR needs host data; use Buffer::from_slice".into(),
            ));
        }
        Self::create_raw(context, flags, size, None)
    }

    /// Allocates a buffer initialised with a copy of `data`.
    pub fn from_slice<T: Pod>(context: &Context, flags: MemFlags, data: &[T]) -> Result<Self> {
        Self::check_flags(flags)?;
        let bytes: &[u8] = bytemuck::cast_slice(data);
        Self::create_raw(context, flags | MemFlags::COPY_HOST_PTR, bytes.len(), Some(bytes))
    }

    // The host pointer of USE_HOST_PTR would outlive the borrow it came from.
    fn check_flags(flags: MemFlags) -> Result<()> {
        if flags.contains(MemFlags::USE_HOST_PTR) {
            return Err(ClError::Unsupported(
                "USE_HOST_PTR buffers are not supported".into(),
            ));
        }
        Ok(())
    }

    fn create_raw(
        context: &Context,
        flags: MemFlags,
        size: usize,
        host_data: Option<&[u8]>,
    ) -> Result<Self> {
        let driver = Arc::clone(context.driver());
        let raw = driver.create_buffer(context.raw(), flags, size, host_data)?;
        log::debug!("Created buffer {:?} ({} bytes, {:?})", raw, size, flags);
        Ok(Self {
            handle: Handle::from_owned(driver, raw),
            context: context.clone(),
        })
    }

    pub fn raw(&self) -> RawMem {
        self.handle.raw()
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        self.handle.driver()
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Size in bytes.
    pub fn size(&self) -> Result<usize> {
        self.driver()
            .mem_info(self.raw(), MemInfo::Size)?
            .into_size(MemInfo::Size.label())
    }

    pub fn flags(&self) -> Result<MemFlags> {
        let bits = self
            .driver()
            .mem_info(self.raw(), MemInfo::Flags)?
            .into_bitfield(MemInfo::Flags.label())?;
        Ok(MemFlags::from_bits(bits))
    }

    pub fn mem_type(&self) -> Result<MemObjectType> {
        let code = self
            .driver()
            .mem_info(self.raw(), MemInfo::Type)?
            .into_uint(MemInfo::Type.label())?;
        Ok(MemObjectType::from_code(code))
    }

    pub fn reference_count(&self) -> Result<u32> {
        self.driver()
            .mem_info(self.raw(), MemInfo::ReferenceCount)?
            .into_uint(MemInfo::ReferenceCount.label())
    }

    pub fn release(self) -> Result<()> {
        self.handle.release()
    }
}
