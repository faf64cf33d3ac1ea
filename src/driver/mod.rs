//! The native API seam.
//!
//! [`Driver`] is the set of OpenCL entry points the safe wrappers forward to.
//! Two implementations exist:
//!
//! - [`SimDriver`]: an in-process object model with OpenCL's reference
//!   counting and validation rules. Always available.
//! - `NativeDriver`: the system ICD loader via `cl3` (feature `opencl`).

use std::fmt;
use std::sync::Arc;

use crate::config::{ClConfig, DriverKind};
use crate::error::{ClError, Result};
use crate::types::{DeviceType, MemFlags, SamplerDesc};

#[cfg(feature = "opencl")]
pub mod native;
pub mod sim;

#[cfg(feature = "opencl")]
pub use native::NativeDriver;
pub use sim::{SimDeviceSpec, SimDriver};

macro_rules! raw_handle {
    ($( $(#[$meta:meta])* $name:ident ),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(usize);

            impl $name {
                pub const fn from_raw(raw: usize) -> Self {
                    Self(raw)
                }

                pub const fn as_raw(self) -> usize {
                    self.0
                }
            }
        )*
    };
}

raw_handle! {
    /// `cl_platform_id`
    RawPlatform,
    /// `cl_device_id`
    RawDevice,
    /// `cl_context`
    RawContext,
    /// `cl_program`
    RawProgram,
    /// `cl_kernel`
    RawKernel,
    /// `cl_mem`
    RawMem,
    /// `cl_sampler`
    RawSampler,
}

macro_rules! info_params {
    ($( $(#[$meta:meta])* $name:ident { $( $variant:ident = $code:literal => $label:literal ),* $(,)? } )*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
            pub enum $name {
                $( $variant, )*
            }

            impl $name {
                /// The `CL_*` parameter constant.
                pub const fn code(self) -> u32 {
                    match self {
                        $( $name::$variant => $code, )*
                    }
                }

                /// The `CL_*` parameter name.
                pub const fn label(self) -> &'static str {
                    match self {
                        $( $name::$variant => $label, )*
                    }
                }
            }
        )*
    };
}

info_params! {
    /// `cl_platform_info`
    PlatformInfo {
        Profile = 0x0900 => "CL_PLATFORM_PROFILE",
        Version = 0x0901 => "CL_PLATFORM_VERSION",
        Name = 0x0902 => "CL_PLATFORM_NAME",
        Vendor = 0x0903 => "CL_PLATFORM_VENDOR",
        Extensions = 0x0904 => "CL_PLATFORM_EXTENSIONS",
    }

    /// `cl_device_info`
    DeviceInfo {
        Type = 0x1000 => "CL_DEVICE_TYPE",
        VendorId = 0x1001 => "CL_DEVICE_VENDOR_ID",
        MaxComputeUnits = 0x1002 => "CL_DEVICE_MAX_COMPUTE_UNITS",
        MaxWorkItemDimensions = 0x1003 => "CL_DEVICE_MAX_WORK_ITEM_DIMENSIONS",
        MaxWorkGroupSize = 0x1004 => "CL_DEVICE_MAX_WORK_GROUP_SIZE",
        MaxWorkItemSizes = 0x1005 => "CL_DEVICE_MAX_WORK_ITEM_SIZES",
        MaxClockFrequency = 0x100C => "CL_DEVICE_MAX_CLOCK_FREQUENCY",
        MaxMemAllocSize = 0x1010 => "CL_DEVICE_MAX_MEM_ALLOC_SIZE",
        ImageSupport = 0x1016 => "CL_DEVICE_IMAGE_SUPPORT",
        GlobalMemSize = 0x101F => "CL_DEVICE_GLOBAL_MEM_SIZE",
        LocalMemSize = 0x1023 => "CL_DEVICE_LOCAL_MEM_SIZE",
        Available = 0x1027 => "CL_DEVICE_AVAILABLE",
        CompilerAvailable = 0x1028 => "CL_DEVICE_COMPILER_AVAILABLE",
        Name = 0x102B => "CL_DEVICE_NAME",
        Vendor = 0x102C => "CL_DEVICE_VENDOR",
        DriverVersion = 0x102D => "CL_DRIVER_VERSION",
        Profile = 0x102E => "CL_DEVICE_PROFILE",
        Version = 0x102F => "CL_DEVICE_VERSION",
        Extensions = 0x1030 => "CL_DEVICE_EXTENSIONS",
        Platform = 0x1031 => "CL_DEVICE_PLATFORM",
    }

    /// `cl_context_info`
    ContextInfo {
        ReferenceCount = 0x1080 => "CL_CONTEXT_REFERENCE_COUNT",
        Devices = 0x1081 => "CL_CONTEXT_DEVICES",
        NumDevices = 0x1083 => "CL_CONTEXT_NUM_DEVICES",
    }

    /// `cl_program_info`
    ProgramInfo {
        ReferenceCount = 0x1160 => "CL_PROGRAM_REFERENCE_COUNT",
        Context = 0x1161 => "CL_PROGRAM_CONTEXT",
        NumDevices = 0x1162 => "CL_PROGRAM_NUM_DEVICES",
        Devices = 0x1163 => "CL_PROGRAM_DEVICES",
        Source = 0x1164 => "CL_PROGRAM_SOURCE",
        NumKernels = 0x1167 => "CL_PROGRAM_NUM_KERNELS",
        KernelNames = 0x1168 => "CL_PROGRAM_KERNEL_NAMES",
    }

    /// `cl_program_build_info`
    ProgramBuildInfo {
        Status = 0x1181 => "CL_PROGRAM_BUILD_STATUS",
        Options = 0x1182 => "CL_PROGRAM_BUILD_OPTIONS",
        Log = 0x1183 => "CL_PROGRAM_BUILD_LOG",
    }

    /// `cl_kernel_info`
    KernelInfo {
        FunctionName = 0x1190 => "CL_KERNEL_FUNCTION_NAME",
        NumArgs = 0x1191 => "CL_KERNEL_NUM_ARGS",
        ReferenceCount = 0x1192 => "CL_KERNEL_REFERENCE_COUNT",
        Context = 0x1193 => "CL_KERNEL_CONTEXT",
        Program = 0x1194 => "CL_KERNEL_PROGRAM",
        Attributes = 0x1195 => "CL_KERNEL_ATTRIBUTES",
    }

    /// `cl_kernel_work_group_info`
    KernelWorkGroupInfo {
        WorkGroupSize = 0x11B0 => "CL_KERNEL_WORK_GROUP_SIZE",
        CompileWorkGroupSize = 0x11B1 => "CL_KERNEL_COMPILE_WORK_GROUP_SIZE",
        LocalMemSize = 0x11B2 => "CL_KERNEL_LOCAL_MEM_SIZE",
        PreferredWorkGroupSizeMultiple = 0x11B3 => "CL_KERNEL_PREFERRED_WORK_GROUP_SIZE_MULTIPLE",
        PrivateMemSize = 0x11B4 => "CL_KERNEL_PRIVATE_MEM_SIZE",
    }

    /// `cl_mem_info`
    MemInfo {
        Type = 0x1100 => "CL_MEM_TYPE",
        Flags = 0x1101 => "CL_MEM_FLAGS",
        Size = 0x1102 => "CL_MEM_SIZE",
        ReferenceCount = 0x1105 => "CL_MEM_REFERENCE_COUNT",
        Context = 0x1106 => "CL_MEM_CONTEXT",
    }

    /// `cl_sampler_info`
    SamplerInfo {
        ReferenceCount = 0x1150 => "CL_SAMPLER_REFERENCE_COUNT",
        Context = 0x1151 => "CL_SAMPLER_CONTEXT",
        NormalizedCoords = 0x1152 => "CL_SAMPLER_NORMALIZED_COORDS",
        AddressingMode = 0x1153 => "CL_SAMPLER_ADDRESSING_MODE",
        FilterMode = 0x1154 => "CL_SAMPLER_FILTER_MODE",
    }
}

/// Answer to an info query, shaped after the parameter's C type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfoValue {
    Int(i32),
    Uint(u32),
    Ulong(u64),
    Size(usize),
    Sizes(Vec<usize>),
    Bool(bool),
    Bitfield(u64),
    Text(String),
    Handle(usize),
    Handles(Vec<usize>),
}

impl InfoValue {
    fn mismatch(param: &'static str, expected: &'static str) -> ClError {
        ClError::UnexpectedInfo { param, expected }
    }

    pub fn into_text(self, param: &'static str) -> Result<String> {
        match self {
            InfoValue::Text(s) => Ok(s),
            _ => Err(Self::mismatch(param, "string")),
        }
    }

    pub fn into_int(self, param: &'static str) -> Result<i32> {
        match self {
            InfoValue::Int(v) => Ok(v),
            _ => Err(Self::mismatch(param, "cl_int")),
        }
    }

    pub fn into_uint(self, param: &'static str) -> Result<u32> {
        match self {
            InfoValue::Uint(v) => Ok(v),
            _ => Err(Self::mismatch(param, "cl_uint")),
        }
    }

    /// Accepts any unsigned integer shape; drivers disagree on `cl_ulong`
    /// versus `size_t` for some memory sizes.
    pub fn into_ulong(self, param: &'static str) -> Result<u64> {
        match self {
            InfoValue::Ulong(v) | InfoValue::Bitfield(v) => Ok(v),
            InfoValue::Uint(v) => Ok(v as u64),
            InfoValue::Size(v) => Ok(v as u64),
            _ => Err(Self::mismatch(param, "cl_ulong")),
        }
    }

    pub fn into_size(self, param: &'static str) -> Result<usize> {
        match self {
            InfoValue::Size(v) => Ok(v),
            _ => Err(Self::mismatch(param, "size_t")),
        }
    }

    pub fn into_sizes(self, param: &'static str) -> Result<Vec<usize>> {
        match self {
            InfoValue::Sizes(v) => Ok(v),
            _ => Err(Self::mismatch(param, "size_t[]")),
        }
    }

    pub fn into_bool(self, param: &'static str) -> Result<bool> {
        match self {
            InfoValue::Bool(v) => Ok(v),
            InfoValue::Uint(v) => Ok(v != 0),
            _ => Err(Self::mismatch(param, "cl_bool")),
        }
    }

    pub fn into_bitfield(self, param: &'static str) -> Result<u64> {
        match self {
            InfoValue::Bitfield(v) | InfoValue::Ulong(v) => Ok(v),
            _ => Err(Self::mismatch(param, "bitfield")),
        }
    }

    pub fn into_handle(self, param: &'static str) -> Result<usize> {
        match self {
            InfoValue::Handle(v) => Ok(v),
            _ => Err(Self::mismatch(param, "handle")),
        }
    }

    pub fn into_handles(self, param: &'static str) -> Result<Vec<usize>> {
        match self {
            InfoValue::Handles(v) => Ok(v),
            _ => Err(Self::mismatch(param, "handle[]")),
        }
    }
}

/// One `clSetKernelArg` call's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelArg<'a> {
    /// By-value argument: `arg_size = bytes.len()`, `arg_value = bytes`.
    Value(&'a [u8]),
    /// `__global` / `__constant` buffer.
    Mem(RawMem),
    Sampler(RawSampler),
    /// `__local` allocation of the given size; `arg_value` is null.
    Local(usize),
}

impl KernelArg<'_> {
    /// `arg_size` as the native call sees it.
    pub fn size(&self) -> usize {
        match self {
            KernelArg::Value(bytes) => bytes.len(),
            KernelArg::Mem(_) | KernelArg::Sampler(_) => std::mem::size_of::<usize>(),
            KernelArg::Local(size) => *size,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            KernelArg::Value(_) => "value",
            KernelArg::Mem(_) => "mem",
            KernelArg::Sampler(_) => "sampler",
            KernelArg::Local(_) => "local",
        }
    }
}

/// OpenCL entry points used by the wrappers.
///
/// Every method maps to one native call and returns the native status
/// translated into [`ClError`]. Implementations must be thread-safe; the only
/// call that is not safe to race on the same object (`set_kernel_arg`) is
/// serialised by the wrappers through `&mut` access.
pub trait Driver: Send + Sync + fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &str;

    fn platform_ids(&self) -> Result<Vec<RawPlatform>>;
    fn platform_info(&self, platform: RawPlatform, param: PlatformInfo) -> Result<InfoValue>;

    fn device_ids(&self, platform: RawPlatform, device_type: DeviceType) -> Result<Vec<RawDevice>>;
    fn device_info(&self, device: RawDevice, param: DeviceInfo) -> Result<InfoValue>;

    fn create_context(&self, devices: &[RawDevice]) -> Result<RawContext>;
    fn context_info(&self, context: RawContext, param: ContextInfo) -> Result<InfoValue>;
    fn retain_context(&self, context: RawContext) -> Result<()>;
    fn release_context(&self, context: RawContext) -> Result<()>;

    fn create_program_with_source(&self, context: RawContext, source: &str) -> Result<RawProgram>;
    /// An empty `devices` slice builds for every device of the program's context.
    fn build_program(&self, program: RawProgram, devices: &[RawDevice], options: &str) -> Result<()>;
    fn program_info(&self, program: RawProgram, param: ProgramInfo) -> Result<InfoValue>;
    fn program_build_info(
        &self,
        program: RawProgram,
        device: RawDevice,
        param: ProgramBuildInfo,
    ) -> Result<InfoValue>;
    fn retain_program(&self, program: RawProgram) -> Result<()>;
    fn release_program(&self, program: RawProgram) -> Result<()>;

    fn create_kernel(&self, program: RawProgram, name: &str) -> Result<RawKernel>;
    fn create_kernels_in_program(&self, program: RawProgram) -> Result<Vec<RawKernel>>;
    fn set_kernel_arg(&self, kernel: RawKernel, index: u32, arg: KernelArg<'_>) -> Result<()>;
    fn kernel_info(&self, kernel: RawKernel, param: KernelInfo) -> Result<InfoValue>;
    fn kernel_work_group_info(
        &self,
        kernel: RawKernel,
        device: RawDevice,
        param: KernelWorkGroupInfo,
    ) -> Result<InfoValue>;
    fn retain_kernel(&self, kernel: RawKernel) -> Result<()>;
    fn release_kernel(&self, kernel: RawKernel) -> Result<()>;

    /// `host_data` is read only when `flags` contains `USE_HOST_PTR` or
    /// `COPY_HOST_PTR`.
    fn create_buffer(
        &self,
        context: RawContext,
        flags: MemFlags,
        size: usize,
        host_data: Option<&[u8]>,
    ) -> Result<RawMem>;
    fn mem_info(&self, mem: RawMem, param: MemInfo) -> Result<InfoValue>;
    fn retain_mem(&self, mem: RawMem) -> Result<()>;
    fn release_mem(&self, mem: RawMem) -> Result<()>;

    fn create_sampler(&self, context: RawContext, desc: SamplerDesc) -> Result<RawSampler>;
    fn sampler_info(&self, sampler: RawSampler, param: SamplerInfo) -> Result<InfoValue>;
    fn retain_sampler(&self, sampler: RawSampler) -> Result<()>;
    fn release_sampler(&self, sampler: RawSampler) -> Result<()>;
}

/// Opens the driver selected by `config`.
pub fn open(config: &ClConfig) -> Result<Arc<dyn Driver>> {
    match config.driver {
        DriverKind::Sim => {
            log::debug!("Using simulated OpenCL driver");
            Ok(Arc::new(SimDriver::new()))
        }
        #[cfg(feature = "opencl")]
        DriverKind::Native => {
            log::debug!("Using native OpenCL driver");
            Ok(Arc::new(NativeDriver::new()))
        }
        #[cfg(not(feature = "opencl"))]
        DriverKind::Native => Err(ClError::Unsupported(
            "native driver requested but clbind was built without the `opencl` feature".into(),
        )),
    }
}
