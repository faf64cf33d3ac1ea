//! Kernel objects: metadata, work-group limits and argument binding.

use std::ffi::CString;
use std::sync::Arc;

use bytemuck::Pod;

use crate::context::Context;
use crate::device::Device;
use crate::driver::{Driver, KernelArg, KernelInfo, KernelWorkGroupInfo, RawKernel, RawProgram};
use crate::error::{ClError, Result};
use crate::handle::{Handle, KernelKind};
use crate::memory::Buffer;
use crate::program::Program;
use crate::sampler::Sampler;

/// A kernel created from a built [`Program`].
///
/// The kernel keeps its program, and through it the context, alive. It is not
/// `Clone`: bound arguments belong to one native kernel object, and binding
/// takes `&mut self` because `clSetKernelArg` must not race on a kernel.
#[derive(Debug)]
pub struct Kernel {
    handle: Handle<KernelKind>,
    program: Program,
    function_name: String,
}

impl Kernel {
    pub fn create(program: &Program, name: &str) -> Result<Self> {
        if CString::new(name).is_err() {
            return Err(ClError::InvalidArgument(format!(
                "kernel name {:?} contains a NUL byte",
                name
            )));
        }
        let driver = Arc::clone(program.driver());
        let raw = driver.create_kernel(program.raw(), name)?;
        let kernel = Self::from_handle(program.clone(), Handle::from_owned(driver, raw))?;
        log::debug!("Created kernel '{}' {:?}", kernel.function_name, raw);
        Ok(kernel)
    }

    /// Wraps an owned kernel reference; the function name is read once here.
    pub(crate) fn from_handle(program: Program, handle: Handle<KernelKind>) -> Result<Self> {
        let function_name = handle
            .driver()
            .kernel_info(handle.raw(), KernelInfo::FunctionName)?
            .into_text(KernelInfo::FunctionName.label())?;
        Ok(Self {
            handle,
            program,
            function_name,
        })
    }

    pub fn raw(&self) -> RawKernel {
        self.handle.raw()
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        self.handle.driver()
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    pub fn num_args(&self) -> Result<u32> {
        self.driver()
            .kernel_info(self.raw(), KernelInfo::NumArgs)?
            .into_uint(KernelInfo::NumArgs.label())
    }

    /// Attributes declared in source, e.g. `reqd_work_group_size(8,8,1)`.
    pub fn attributes(&self) -> Result<String> {
        self.driver()
            .kernel_info(self.raw(), KernelInfo::Attributes)?
            .into_text(KernelInfo::Attributes.label())
    }

    pub fn reference_count(&self) -> Result<u32> {
        self.driver()
            .kernel_info(self.raw(), KernelInfo::ReferenceCount)?
            .into_uint(KernelInfo::ReferenceCount.label())
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn context(&self) -> &Context {
        self.program.context()
    }

    /// Asks the driver which program owns this kernel.
    pub fn query_program(&self) -> Result<Program> {
        let raw = self
            .driver()
            .kernel_info(self.raw(), KernelInfo::Program)?
            .into_handle(KernelInfo::Program.label())?;
        Program::retained(self.context().clone(), RawProgram::from_raw(raw))
    }

    /// Asks the driver which context owns this kernel.
    pub fn query_context(&self) -> Result<Context> {
        let raw = self
            .driver()
            .kernel_info(self.raw(), KernelInfo::Context)?
            .into_handle(KernelInfo::Context.label())?;
        Context::retained(
            Arc::clone(self.driver()),
            crate::driver::RawContext::from_raw(raw),
        )
    }

    // Work-group queries

    pub fn work_group_size(&self, device: &Device) -> Result<usize> {
        self.driver()
            .kernel_work_group_info(self.raw(), device.raw(), KernelWorkGroupInfo::WorkGroupSize)?
            .into_size(KernelWorkGroupInfo::WorkGroupSize.label())
    }

    /// `reqd_work_group_size` from source, or `[0, 0, 0]` when not declared.
    pub fn compile_work_group_size(&self, device: &Device) -> Result<[usize; 3]> {
        let param = KernelWorkGroupInfo::CompileWorkGroupSize;
        let sizes = self
            .driver()
            .kernel_work_group_info(self.raw(), device.raw(), param)?
            .into_sizes(param.label())?;
        <[usize; 3]>::try_from(sizes).map_err(|_| ClError::UnexpectedInfo {
            param: param.label(),
            expected: "size_t[3]",
        })
    }

    pub fn local_mem_size(&self, device: &Device) -> Result<u64> {
        self.driver()
            .kernel_work_group_info(self.raw(), device.raw(), KernelWorkGroupInfo::LocalMemSize)?
            .into_ulong(KernelWorkGroupInfo::LocalMemSize.label())
    }

    pub fn preferred_work_group_size_multiple(&self, device: &Device) -> Result<usize> {
        let param = KernelWorkGroupInfo::PreferredWorkGroupSizeMultiple;
        self.driver()
            .kernel_work_group_info(self.raw(), device.raw(), param)?
            .into_size(param.label())
    }

    pub fn private_mem_size(&self, device: &Device) -> Result<u64> {
        self.driver()
            .kernel_work_group_info(self.raw(), device.raw(), KernelWorkGroupInfo::PrivateMemSize)?
            .into_ulong(KernelWorkGroupInfo::PrivateMemSize.label())
    }

    // Argument binding

    pub fn set_arg(&mut self, index: u32, arg: KernelArg<'_>) -> Result<()> {
        log::trace!(
            "Binding {} argument {} of '{}' ({} bytes)",
            arg.kind(),
            index,
            self.function_name,
            arg.size()
        );
        self.driver().set_kernel_arg(self.raw(), index, arg)
    }

    /// Binds a plain value (scalar, vector or `#[repr(C)]` struct).
    pub fn set_value_arg<T: Pod>(&mut self, index: u32, value: &T) -> Result<()> {
        self.set_arg(index, KernelArg::Value(bytemuck::bytes_of(value)))
    }

    pub fn set_mem_arg(&mut self, index: u32, buffer: &Buffer) -> Result<()> {
        self.check_same_driver(buffer.driver())?;
        self.set_arg(index, KernelArg::Mem(buffer.raw()))
    }

    pub fn set_sampler_arg(&mut self, index: u32, sampler: &Sampler) -> Result<()> {
        self.check_same_driver(sampler.driver())?;
        self.set_arg(index, KernelArg::Sampler(sampler.raw()))
    }

    /// Reserves `size` bytes of `__local` memory for the argument.
    pub fn set_local_arg(&mut self, index: u32, size: usize) -> Result<()> {
        self.set_arg(index, KernelArg::Local(size))
    }

    /// Binds a NULL `__global` pointer.
    pub fn set_null_mem_arg(&mut self, index: u32) -> Result<()> {
        self.set_arg(index, KernelArg::Value(bytemuck::bytes_of(&0usize)))
    }

    fn check_same_driver(&self, other: &Arc<dyn Driver>) -> Result<()> {
        if Arc::ptr_eq(self.driver(), other) {
            Ok(())
        } else {
            Err(ClError::InvalidArgument(format!(
                "argument of kernel '{}' belongs to a different driver",
                self.function_name
            )))
        }
    }

    /// Releases the kernel's reference now.
    pub fn release(self) -> Result<()> {
        log::trace!("Releasing kernel '{}'", self.function_name);
        self.handle.release()
    }
}
