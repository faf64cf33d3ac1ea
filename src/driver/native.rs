//! Driver backed by the system OpenCL ICD loader through `cl3`.

use std::ffi::{CString, c_void};
use std::ptr;

use cl3::info_type::InfoType;
use cl3::types::{cl_context, cl_device_id, cl_int, cl_kernel, cl_mem, cl_platform_id, cl_program, cl_sampler};

use crate::driver::{
    ContextInfo, DeviceInfo, Driver, InfoValue, KernelArg, KernelInfo, KernelWorkGroupInfo,
    MemInfo, PlatformInfo, ProgramBuildInfo, ProgramInfo, RawContext, RawDevice, RawKernel,
    RawMem, RawPlatform, RawProgram, RawSampler, SamplerInfo,
};
use crate::error::{ClError, Result, Status};
use crate::types::{DeviceType, MemFlags, SamplerDesc};

fn check<T>(operation: &'static str, result: std::result::Result<T, cl_int>) -> Result<T> {
    result.map_err(|code| ClError::native(operation, Status::from_code(code)))
}

fn cstring(what: &str, value: &str) -> Result<CString> {
    CString::new(value)
        .map_err(|_| ClError::InvalidArgument(format!("{} contains an interior NUL byte", what)))
}

/// Reshapes a `cl3` answer into an [`InfoValue`].
fn info_value(param: &'static str, info: InfoType) -> Result<InfoValue> {
    Ok(match info {
        InfoType::Int(v) => InfoValue::Int(v),
        InfoType::Uint(v) => InfoValue::Uint(v),
        InfoType::Ulong(v) => InfoValue::Ulong(v),
        InfoType::Size(v) => InfoValue::Size(v),
        InfoType::Ptr(v) => InfoValue::Handle(v as usize),
        InfoType::VecSize(v) => InfoValue::Sizes(v),
        InfoType::VecIntPtr(v) => InfoValue::Handles(v.into_iter().map(|p| p as usize).collect()),
        InfoType::VecUchar(bytes) => InfoValue::Text(
            String::from_utf8_lossy(&bytes)
                .trim_end_matches('\0')
                .to_string(),
        ),
        _ => {
            return Err(ClError::UnexpectedInfo {
                param,
                expected: "scalar, string or handle",
            });
        }
    })
}

fn platform_ptr(raw: RawPlatform) -> cl_platform_id {
    raw.as_raw() as cl_platform_id
}

fn device_ptr(raw: RawDevice) -> cl_device_id {
    raw.as_raw() as cl_device_id
}

fn context_ptr(raw: RawContext) -> cl_context {
    raw.as_raw() as cl_context
}

fn program_ptr(raw: RawProgram) -> cl_program {
    raw.as_raw() as cl_program
}

fn kernel_ptr(raw: RawKernel) -> cl_kernel {
    raw.as_raw() as cl_kernel
}

fn mem_ptr(raw: RawMem) -> cl_mem {
    raw.as_raw() as cl_mem
}

fn sampler_ptr(raw: RawSampler) -> cl_sampler {
    raw.as_raw() as cl_sampler
}

/// Native OpenCL through the ICD loader.
#[derive(Debug, Default)]
pub struct NativeDriver;

impl NativeDriver {
    pub fn new() -> Self {
        Self
    }
}

// `cl3` declares the retain/release entry points `unsafe`; the handles passed
// in are owned by a live `Handle`.
macro_rules! refcount_ops {
    ($( $retain:ident, $release:ident, $raw:ty, $ptr:ident, $cl_retain:path, $cl_release:path, $retain_op:literal, $release_op:literal; )*) => {
        $(
            fn $retain(&self, raw: $raw) -> Result<()> {
                #[allow(unused_unsafe)]
                let result = unsafe { $cl_retain($ptr(raw)) };
                check($retain_op, result)
            }

            fn $release(&self, raw: $raw) -> Result<()> {
                #[allow(unused_unsafe)]
                let result = unsafe { $cl_release($ptr(raw)) };
                check($release_op, result)
            }
        )*
    };
}

impl Driver for NativeDriver {
    fn name(&self) -> &str {
        "native"
    }

    fn platform_ids(&self) -> Result<Vec<RawPlatform>> {
        let ids = check("clGetPlatformIDs", cl3::platform::get_platform_ids())?;
        Ok(ids
            .into_iter()
            .map(|id| RawPlatform::from_raw(id as usize))
            .collect())
    }

    fn platform_info(&self, platform: RawPlatform, param: PlatformInfo) -> Result<InfoValue> {
        let info = check(
            "clGetPlatformInfo",
            cl3::platform::get_platform_info(platform_ptr(platform), param.code()),
        )?;
        info_value(param.label(), info)
    }

    fn device_ids(&self, platform: RawPlatform, device_type: DeviceType) -> Result<Vec<RawDevice>> {
        let ids = check(
            "clGetDeviceIDs",
            cl3::device::get_device_ids(platform_ptr(platform), device_type.bits()),
        )?;
        Ok(ids
            .into_iter()
            .map(|id| RawDevice::from_raw(id as usize))
            .collect())
    }

    fn device_info(&self, device: RawDevice, param: DeviceInfo) -> Result<InfoValue> {
        let info = check(
            "clGetDeviceInfo",
            cl3::device::get_device_info(device_ptr(device), param.code()),
        )?;
        info_value(param.label(), info)
    }

    fn create_context(&self, devices: &[RawDevice]) -> Result<RawContext> {
        let ids: Vec<cl_device_id> = devices.iter().copied().map(device_ptr).collect();
        #[allow(unused_unsafe)]
        let result = unsafe { cl3::context::create_context(&ids, ptr::null(), None, ptr::null_mut()) };
        let context = check("clCreateContext", result)?;
        Ok(RawContext::from_raw(context as usize))
    }

    fn context_info(&self, context: RawContext, param: ContextInfo) -> Result<InfoValue> {
        let info = check(
            "clGetContextInfo",
            cl3::context::get_context_info(context_ptr(context), param.code()),
        )?;
        info_value(param.label(), info)
    }

    fn create_program_with_source(&self, context: RawContext, source: &str) -> Result<RawProgram> {
        #[allow(unused_unsafe)]
        let result = unsafe { cl3::program::create_program_with_source(context_ptr(context), &[source]) };
        let program = check("clCreateProgramWithSource", result)?;
        Ok(RawProgram::from_raw(program as usize))
    }

    fn build_program(&self, program: RawProgram, devices: &[RawDevice], options: &str) -> Result<()> {
        let ids: Vec<cl_device_id> = devices.iter().copied().map(device_ptr).collect();
        let options = cstring("build options", options)?;
        #[allow(unused_unsafe)]
        let result = unsafe {
            cl3::program::build_program(program_ptr(program), &ids, &options, None, ptr::null_mut())
        };
        check("clBuildProgram", result)
    }

    fn program_info(&self, program: RawProgram, param: ProgramInfo) -> Result<InfoValue> {
        let info = check(
            "clGetProgramInfo",
            cl3::program::get_program_info(program_ptr(program), param.code()),
        )?;
        info_value(param.label(), info)
    }

    fn program_build_info(
        &self,
        program: RawProgram,
        device: RawDevice,
        param: ProgramBuildInfo,
    ) -> Result<InfoValue> {
        let info = check(
            "clGetProgramBuildInfo",
            cl3::program::get_program_build_info(program_ptr(program), device_ptr(device), param.code()),
        )?;
        info_value(param.label(), info)
    }

    fn create_kernel(&self, program: RawProgram, name: &str) -> Result<RawKernel> {
        let name = cstring("kernel name", name)?;
        #[allow(unused_unsafe)]
        let result = unsafe { cl3::kernel::create_kernel(program_ptr(program), &name) };
        let kernel = check("clCreateKernel", result)?;
        Ok(RawKernel::from_raw(kernel as usize))
    }

    fn create_kernels_in_program(&self, program: RawProgram) -> Result<Vec<RawKernel>> {
        #[allow(unused_unsafe)]
        let result = unsafe { cl3::kernel::create_kernels_in_program(program_ptr(program)) };
        let kernels = check("clCreateKernelsInProgram", result)?;
        Ok(kernels
            .into_iter()
            .map(|k| RawKernel::from_raw(k as usize))
            .collect())
    }

    fn set_kernel_arg(&self, kernel: RawKernel, index: u32, arg: KernelArg<'_>) -> Result<()> {
        // The handle values must outlive the call, so they are bound here.
        let mem;
        let sampler;
        let value: *const c_void = match arg {
            KernelArg::Value(bytes) => bytes.as_ptr().cast(),
            KernelArg::Mem(raw) => {
                mem = mem_ptr(raw);
                (&mem as *const cl_mem).cast()
            }
            KernelArg::Sampler(raw) => {
                sampler = sampler_ptr(raw);
                (&sampler as *const cl_sampler).cast()
            }
            KernelArg::Local(_) => ptr::null(),
        };
        // SAFETY: `value` points to `arg.size()` readable bytes, or is null for
        // a `__local` argument.
        let result = unsafe { cl3::kernel::set_kernel_arg(kernel_ptr(kernel), index, arg.size(), value) };
        check("clSetKernelArg", result)
    }

    fn kernel_info(&self, kernel: RawKernel, param: KernelInfo) -> Result<InfoValue> {
        let info = check(
            "clGetKernelInfo",
            cl3::kernel::get_kernel_info(kernel_ptr(kernel), param.code()),
        )?;
        info_value(param.label(), info)
    }

    fn kernel_work_group_info(
        &self,
        kernel: RawKernel,
        device: RawDevice,
        param: KernelWorkGroupInfo,
    ) -> Result<InfoValue> {
        let info = check(
            "clGetKernelWorkGroupInfo",
            cl3::kernel::get_kernel_work_group_info(kernel_ptr(kernel), device_ptr(device), param.code()),
        )?;
        info_value(param.label(), info)
    }

    fn create_buffer(
        &self,
        context: RawContext,
        flags: MemFlags,
        size: usize,
        host_data: Option<&[u8]>,
    ) -> Result<RawMem> {
        let host_ptr = match host_data {
            Some(data) if flags.takes_host_data() => {
                if data.len() < size {
                    return Err(ClError::InvalidArgument(format!(
                        "host data holds {} bytes but the buffer needs {}",
                        data.len(),
                        size
                    )));
                }
                data.as_ptr() as *mut c_void
            }
            _ => ptr::null_mut(),
        };
        // SAFETY: with COPY_HOST_PTR the driver reads `size` bytes during the
        // call. USE_HOST_PTR is rejected by the safe wrapper, so the pointer is
        // never retained past the call.
        let result = unsafe { cl3::memory::create_buffer(context_ptr(context), flags.bits(), size, host_ptr) };
        let mem = check("clCreateBuffer", result)?;
        Ok(RawMem::from_raw(mem as usize))
    }

    fn mem_info(&self, mem: RawMem, param: MemInfo) -> Result<InfoValue> {
        let info = check(
            "clGetMemObjectInfo",
            cl3::memory::get_mem_object_info(mem_ptr(mem), param.code()),
        )?;
        info_value(param.label(), info)
    }

    fn create_sampler(&self, context: RawContext, desc: SamplerDesc) -> Result<RawSampler> {
        #[allow(unused_unsafe, deprecated)]
        let result = unsafe {
            cl3::sampler::create_sampler(
                context_ptr(context),
                desc.normalized_coords as u32,
                desc.addressing_mode.code(),
                desc.filter_mode.code(),
            )
        };
        let sampler = check("clCreateSampler", result)?;
        Ok(RawSampler::from_raw(sampler as usize))
    }

    fn sampler_info(&self, sampler: RawSampler, param: SamplerInfo) -> Result<InfoValue> {
        let info = check(
            "clGetSamplerInfo",
            cl3::sampler::get_sampler_info(sampler_ptr(sampler), param.code()),
        )?;
        info_value(param.label(), info)
    }

    refcount_ops! {
        retain_context, release_context, RawContext, context_ptr,
            cl3::context::retain_context, cl3::context::release_context,
            "clRetainContext", "clReleaseContext";
        retain_program, release_program, RawProgram, program_ptr,
            cl3::program::retain_program, cl3::program::release_program,
            "clRetainProgram", "clReleaseProgram";
        retain_kernel, release_kernel, RawKernel, kernel_ptr,
            cl3::kernel::retain_kernel, cl3::kernel::release_kernel,
            "clRetainKernel", "clReleaseKernel";
        retain_mem, release_mem, RawMem, mem_ptr,
            cl3::memory::retain_mem_object, cl3::memory::release_mem_object,
            "clRetainMemObject", "clReleaseMemObject";
        retain_sampler, release_sampler, RawSampler, sampler_ptr,
            cl3::sampler::retain_sampler, cl3::sampler::release_sampler,
            "clRetainSampler", "clReleaseSampler";
    }
}
