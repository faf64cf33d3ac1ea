//! In-process driver that follows the OpenCL object model.
//!
//! Objects live in a table keyed by their raw handle. Reference counting,
//! parent references (kernel → program → context, mem/sampler → context) and
//! the validation rules of the native entry points are reproduced, so the safe
//! wrappers can be exercised without a GPU.

mod source;

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::driver::{
    ContextInfo, DeviceInfo, Driver, InfoValue, KernelArg, KernelInfo, KernelWorkGroupInfo,
    MemInfo, PlatformInfo, ProgramBuildInfo, ProgramInfo, RawContext, RawDevice, RawKernel,
    RawMem, RawPlatform, RawProgram, RawSampler, SamplerInfo,
};
use crate::error::{ClError, Result, Status};
use crate::types::{BuildStatus, DeviceType, MemFlags, MemObjectType, SamplerDesc};

use source::{KernelDecl, ParamKind};

const PLATFORM_ID: usize = 0x10;
const DEVICE_BASE: usize = 0x100;
const OBJECT_BASE: usize = 0x1000;

const PLATFORM_NAME: &str = "clbind Simulated Platform";
const PLATFORM_VENDOR: &str = "clbind";
const PLATFORM_VERSION: &str = "OpenCL 1.2 clbind-sim";
const PLATFORM_PROFILE: &str = "FULL_PROFILE";

/// Build options accepted without a value.
const FLAG_OPTIONS: &[&str] = &[
    "-w",
    "-Werror",
    "-cl-opt-disable",
    "-cl-mad-enable",
    "-cl-no-signed-zeros",
    "-cl-unsafe-math-optimizations",
    "-cl-finite-math-only",
    "-cl-fast-relaxed-math",
    "-cl-single-precision-constant",
    "-cl-denorms-are-zero",
    "-cl-fp32-correctly-rounded-divide-sqrt",
    "-cl-kernel-arg-info",
    "-cl-uniform-work-group-size",
];

const CL_STD_VERSIONS: &[&str] = &["CL1.1", "CL1.2", "CL2.0", "CL3.0"];

/// Description of one simulated device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimDeviceSpec {
    pub name: String,
    pub vendor: String,
    pub vendor_id: u32,
    pub device_type: DeviceType,
    pub max_compute_units: u32,
    pub max_clock_frequency: u32,
    pub max_work_group_size: usize,
    pub max_work_item_sizes: [usize; 3],
    pub preferred_work_group_multiple: usize,
    pub global_mem_size: u64,
    pub local_mem_size: u64,
    pub max_mem_alloc_size: u64,
    pub image_support: bool,
    pub available: bool,
    pub compiler_available: bool,
    pub extensions: String,
}

impl SimDeviceSpec {
    /// A mid-range discrete GPU.
    pub fn gpu(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vendor: "clbind".into(),
            vendor_id: 0x1234,
            device_type: DeviceType::GPU,
            max_compute_units: 32,
            max_clock_frequency: 1500,
            max_work_group_size: 1024,
            max_work_item_sizes: [1024, 1024, 64],
            preferred_work_group_multiple: 32,
            global_mem_size: 8 << 30,
            local_mem_size: 48 << 10,
            max_mem_alloc_size: 2 << 30,
            image_support: true,
            available: true,
            compiler_available: true,
            extensions: "cl_khr_fp64 cl_khr_global_int32_base_atomics".into(),
        }
    }

    /// A host CPU device.
    pub fn cpu(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vendor: "clbind".into(),
            vendor_id: 0x1234,
            device_type: DeviceType::CPU,
            max_compute_units: 8,
            max_clock_frequency: 3000,
            max_work_group_size: 8192,
            max_work_item_sizes: [8192, 8192, 8192],
            preferred_work_group_multiple: 1,
            global_mem_size: 16 << 30,
            local_mem_size: 32 << 10,
            max_mem_alloc_size: 4 << 30,
            image_support: false,
            available: true,
            compiler_available: true,
            extensions: "cl_khr_fp64".into(),
        }
    }

    pub fn with_max_work_group_size(mut self, size: usize) -> Self {
        self.max_work_group_size = size;
        self
    }

    pub fn with_preferred_work_group_multiple(mut self, multiple: usize) -> Self {
        self.preferred_work_group_multiple = multiple;
        self
    }

    pub fn with_max_mem_alloc_size(mut self, size: u64) -> Self {
        self.max_mem_alloc_size = size;
        self
    }

    pub fn with_image_support(mut self, supported: bool) -> Self {
        self.image_support = supported;
        self
    }

    pub fn with_available(mut self, available: bool) -> Self {
        self.available = available;
        self
    }

    pub fn with_compiler_available(mut self, available: bool) -> Self {
        self.compiler_available = available;
        self
    }
}

/// Argument state of a kernel. Only `__local` sizes feed back into queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BoundArg {
    Value,
    Mem,
    Sampler,
    Local(usize),
}

#[derive(Debug)]
struct DeviceBuild {
    status: BuildStatus,
    options: String,
    log: String,
}

#[derive(Debug)]
enum Object {
    Context {
        devices: Vec<RawDevice>,
    },
    Program {
        context: usize,
        source: String,
        builds: HashMap<RawDevice, DeviceBuild>,
        kernels: Vec<KernelDecl>,
        attached_kernels: usize,
    },
    Kernel {
        program: usize,
        decl: KernelDecl,
        args: Vec<Option<BoundArg>>,
    },
    Mem {
        context: usize,
        flags: MemFlags,
        data: Vec<u8>,
    },
    Sampler {
        context: usize,
        desc: SamplerDesc,
    },
}

impl Object {
    fn kind(&self) -> ObjectKind {
        match self {
            Object::Context { .. } => ObjectKind::Context,
            Object::Program { .. } => ObjectKind::Program,
            Object::Kernel { .. } => ObjectKind::Kernel,
            Object::Mem { .. } => ObjectKind::Mem,
            Object::Sampler { .. } => ObjectKind::Sampler,
        }
    }

    /// The object this one holds an implicit reference on.
    fn parent(&self) -> Option<usize> {
        match self {
            Object::Context { .. } => None,
            Object::Program { context, .. }
            | Object::Mem { context, .. }
            | Object::Sampler { context, .. } => Some(*context),
            Object::Kernel { program, .. } => Some(*program),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObjectKind {
    Context,
    Program,
    Kernel,
    Mem,
    Sampler,
}

impl ObjectKind {
    fn invalid(self) -> Status {
        match self {
            ObjectKind::Context => Status::InvalidContext,
            ObjectKind::Program => Status::InvalidProgram,
            ObjectKind::Kernel => Status::InvalidKernel,
            ObjectKind::Mem => Status::InvalidMemObject,
            ObjectKind::Sampler => Status::InvalidSampler,
        }
    }
}

#[derive(Debug)]
struct Entry {
    refcount: u32,
    object: Object,
}

#[derive(Debug, Default)]
struct State {
    next_id: usize,
    objects: HashMap<usize, Entry>,
    injected: HashMap<&'static str, Status>,
}

impl State {
    fn insert(&mut self, object: Object) -> usize {
        let id = OBJECT_BASE + self.next_id;
        self.next_id += 1;
        if let Some(parent) = object.parent() {
            if let Some(entry) = self.objects.get_mut(&parent) {
                entry.refcount += 1;
            }
        }
        self.objects.insert(id, Entry { refcount: 1, object });
        id
    }

    fn entry(&self, id: usize, kind: ObjectKind, op: &'static str) -> Result<&Entry> {
        match self.objects.get(&id) {
            Some(entry) if entry.object.kind() == kind => Ok(entry),
            _ => Err(ClError::native(op, kind.invalid())),
        }
    }

    fn entry_mut(&mut self, id: usize, kind: ObjectKind, op: &'static str) -> Result<&mut Entry> {
        match self.objects.get_mut(&id) {
            Some(entry) if entry.object.kind() == kind => Ok(entry),
            _ => Err(ClError::native(op, kind.invalid())),
        }
    }

    fn retain(&mut self, id: usize, kind: ObjectKind, op: &'static str) -> Result<()> {
        self.entry_mut(id, kind, op)?.refcount += 1;
        Ok(())
    }

    /// Decrements and destroys at zero, cascading to parents.
    fn release(&mut self, id: usize, kind: ObjectKind, op: &'static str) -> Result<()> {
        self.entry(id, kind, op)?;
        let mut next = Some(id);
        while let Some(id) = next.take() {
            let Some(entry) = self.objects.get_mut(&id) else {
                break;
            };
            entry.refcount -= 1;
            if entry.refcount > 0 {
                break;
            }
            if let Some(entry) = self.objects.remove(&id) {
                log::trace!("sim: destroyed {:?} {:#x}", entry.object.kind(), id);
                if let Object::Kernel { program, .. } = &entry.object {
                    if let Some(Entry {
                        object: Object::Program { attached_kernels, .. },
                        ..
                    }) = self.objects.get_mut(program)
                    {
                        *attached_kernels -= 1;
                    }
                }
                next = entry.object.parent();
            }
        }
        Ok(())
    }

    fn refcount(&self, id: usize, kind: ObjectKind, op: &'static str) -> Result<InfoValue> {
        Ok(InfoValue::Uint(self.entry(id, kind, op)?.refcount))
    }

    fn context_devices(&self, context: usize, op: &'static str) -> Result<&[RawDevice]> {
        match &self.entry(context, ObjectKind::Context, op)?.object {
            Object::Context { devices } => Ok(devices),
            _ => Err(ClError::native(op, Status::InvalidContext)),
        }
    }

    fn mem_context(&self, mem: usize) -> Option<usize> {
        match self.objects.get(&mem).map(|e| &e.object) {
            Some(Object::Mem { context, .. }) => Some(*context),
            _ => None,
        }
    }

    fn sampler_context(&self, sampler: usize) -> Option<usize> {
        match self.objects.get(&sampler).map(|e| &e.object) {
            Some(Object::Sampler { context, .. }) => Some(*context),
            _ => None,
        }
    }

    fn program_context(&self, program: usize) -> Option<usize> {
        match self.objects.get(&program).map(|e| &e.object) {
            Some(Object::Program { context, .. }) => Some(*context),
            _ => None,
        }
    }

    fn take_injected(&mut self, op: &'static str) -> Result<()> {
        match self.injected.remove(op) {
            Some(status) => Err(ClError::native(op, status)),
            None => Ok(()),
        }
    }
}

/// Simulated OpenCL driver with one platform and a configurable device list.
#[derive(Debug)]
pub struct SimDriver {
    devices: Vec<SimDeviceSpec>,
    state: Mutex<State>,
}

impl Default for SimDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDriver {
    /// One GPU and one CPU device.
    pub fn new() -> Self {
        Self::with_devices(vec![
            SimDeviceSpec::gpu("clbind Sim GPU"),
            SimDeviceSpec::cpu("clbind Sim CPU"),
        ])
    }

    pub fn with_devices(devices: Vec<SimDeviceSpec>) -> Self {
        Self {
            devices,
            state: Mutex::new(State::default()),
        }
    }

    /// Number of objects not yet destroyed.
    pub fn live_objects(&self) -> usize {
        self.state().objects.len()
    }

    /// Makes the next call of `operation` (e.g. `"clReleaseKernel"`) fail
    /// with `status` without touching any object.
    pub fn fail_next(&self, operation: &'static str, status: Status) {
        self.state().injected.insert(operation, status);
    }

    /// Contents of a buffer, for inspecting what host data was copied in.
    pub fn buffer_contents(&self, mem: RawMem) -> Option<Vec<u8>> {
        match self.state().objects.get(&mem.as_raw()).map(|e| &e.object) {
            Some(Object::Mem { data, .. }) => Some(data.clone()),
            _ => None,
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the state and applies any failure injected for `op`.
    fn begin(&self, op: &'static str) -> Result<MutexGuard<'_, State>> {
        let mut state = self.state();
        state.take_injected(op)?;
        Ok(state)
    }

    fn device(&self, device: RawDevice, op: &'static str) -> Result<&SimDeviceSpec> {
        device
            .as_raw()
            .checked_sub(DEVICE_BASE)
            .and_then(|index| self.devices.get(index))
            .ok_or_else(|| ClError::native(op, Status::InvalidDevice))
    }

    fn device_handle(index: usize) -> RawDevice {
        RawDevice::from_raw(DEVICE_BASE + index)
    }

    fn check_platform(platform: RawPlatform, op: &'static str) -> Result<()> {
        if platform.as_raw() == PLATFORM_ID {
            Ok(())
        } else {
            Err(ClError::native(op, Status::InvalidPlatform))
        }
    }

    fn validate_build_options(options: &str) -> std::result::Result<(), String> {
        let mut words = options.split_whitespace();
        while let Some(word) = words.next() {
            match word {
                "-D" | "-I" => {
                    if words.next().is_none() {
                        return Err(format!("missing value after '{}'", word));
                    }
                }
                w if w.starts_with("-D") || w.starts_with("-I") => {}
                w if w.starts_with("-cl-std=") => {
                    let version = &w["-cl-std=".len()..];
                    if !CL_STD_VERSIONS.contains(&version) {
                        return Err(format!("unsupported OpenCL C version '{}'", version));
                    }
                }
                w if FLAG_OPTIONS.contains(&w) => {}
                other => return Err(format!("unrecognized option '{}'", other)),
            }
        }
        Ok(())
    }

    /// Largest `__local` allocation any device of `context` can hold.
    fn local_mem_limit(&self, state: &State, context: usize, op: &'static str) -> Result<u64> {
        let mut limit = 0;
        for device in state.context_devices(context, op)? {
            limit = limit.max(self.device(*device, op)?.local_mem_size);
        }
        Ok(limit)
    }

    fn bind_arg(
        state: &State,
        context: usize,
        local_limit: u64,
        kind: &ParamKind,
        arg: KernelArg<'_>,
    ) -> std::result::Result<BoundArg, Status> {
        let handle_size = std::mem::size_of::<usize>();
        match (kind, arg) {
            (ParamKind::Global | ParamKind::Constant | ParamKind::Image, KernelArg::Mem(mem)) => {
                if state.mem_context(mem.as_raw()) == Some(context) {
                    Ok(BoundArg::Mem)
                } else {
                    Err(Status::InvalidMemObject)
                }
            }
            // A zeroed handle-sized value is a NULL buffer.
            (ParamKind::Global | ParamKind::Constant, KernelArg::Value(bytes)) => {
                if bytes.len() != handle_size {
                    Err(Status::InvalidArgSize)
                } else if bytes.iter().all(|b| *b == 0) {
                    Ok(BoundArg::Mem)
                } else {
                    Err(Status::InvalidMemObject)
                }
            }
            (ParamKind::Global | ParamKind::Constant | ParamKind::Image, KernelArg::Sampler(_)) => {
                Err(Status::InvalidMemObject)
            }
            (ParamKind::Image, KernelArg::Value(_)) => Err(Status::InvalidMemObject),
            (ParamKind::Local, KernelArg::Local(0)) => Err(Status::InvalidArgSize),
            (ParamKind::Local, KernelArg::Local(size)) if size as u64 > local_limit => {
                Err(Status::InvalidArgSize)
            }
            (ParamKind::Local, KernelArg::Local(size)) => Ok(BoundArg::Local(size)),
            (ParamKind::Local, _) => Err(Status::InvalidArgValue),
            (ParamKind::Sampler, KernelArg::Sampler(sampler)) => {
                if state.sampler_context(sampler.as_raw()) == Some(context) {
                    Ok(BoundArg::Sampler)
                } else {
                    Err(Status::InvalidSampler)
                }
            }
            (ParamKind::Sampler, KernelArg::Value(bytes)) if bytes.len() != handle_size => {
                Err(Status::InvalidArgSize)
            }
            (ParamKind::Sampler, KernelArg::Local(_)) => Err(Status::InvalidArgValue),
            (ParamKind::Sampler, _) => Err(Status::InvalidSampler),
            (_, KernelArg::Local(_)) => Err(Status::InvalidArgValue),
            (ParamKind::Value(expected), arg) => {
                let len = match arg {
                    KernelArg::Value(bytes) => bytes.len(),
                    KernelArg::Mem(_) | KernelArg::Sampler(_) => handle_size,
                    KernelArg::Local(_) => return Err(Status::InvalidArgValue),
                };
                match expected {
                    Some(size) if *size != len => Err(Status::InvalidArgSize),
                    None if len == 0 => Err(Status::InvalidArgSize),
                    _ => Ok(BoundArg::Value),
                }
            }
        }
    }
}

impl Driver for SimDriver {
    fn name(&self) -> &str {
        "sim"
    }

    fn platform_ids(&self) -> Result<Vec<RawPlatform>> {
        self.begin("clGetPlatformIDs")?;
        Ok(vec![RawPlatform::from_raw(PLATFORM_ID)])
    }

    fn platform_info(&self, platform: RawPlatform, param: PlatformInfo) -> Result<InfoValue> {
        const OP: &str = "clGetPlatformInfo";
        self.begin(OP)?;
        Self::check_platform(platform, OP)?;
        let text = match param {
            PlatformInfo::Profile => PLATFORM_PROFILE.to_string(),
            PlatformInfo::Version => PLATFORM_VERSION.to_string(),
            PlatformInfo::Name => PLATFORM_NAME.to_string(),
            PlatformInfo::Vendor => PLATFORM_VENDOR.to_string(),
            PlatformInfo::Extensions => "cl_khr_icd".to_string(),
        };
        Ok(InfoValue::Text(text))
    }

    fn device_ids(&self, platform: RawPlatform, device_type: DeviceType) -> Result<Vec<RawDevice>> {
        const OP: &str = "clGetDeviceIDs";
        self.begin(OP)?;
        Self::check_platform(platform, OP)?;
        if device_type.is_empty() {
            return Err(ClError::native(OP, Status::InvalidDeviceType));
        }

        let ids: Vec<RawDevice> = if device_type == DeviceType::ALL {
            (0..self.devices.len()).map(Self::device_handle).collect()
        } else if device_type == DeviceType::DEFAULT {
            (0..self.devices.len().min(1)).map(Self::device_handle).collect()
        } else {
            self.devices
                .iter()
                .enumerate()
                .filter(|(_, d)| d.device_type.intersects(device_type))
                .map(|(i, _)| Self::device_handle(i))
                .collect()
        };

        if ids.is_empty() {
            return Err(ClError::native(OP, Status::DeviceNotFound));
        }
        Ok(ids)
    }

    fn device_info(&self, device: RawDevice, param: DeviceInfo) -> Result<InfoValue> {
        const OP: &str = "clGetDeviceInfo";
        self.begin(OP)?;
        let d = self.device(device, OP)?;
        Ok(match param {
            DeviceInfo::Type => InfoValue::Bitfield(d.device_type.bits()),
            DeviceInfo::VendorId => InfoValue::Uint(d.vendor_id),
            DeviceInfo::MaxComputeUnits => InfoValue::Uint(d.max_compute_units),
            DeviceInfo::MaxWorkItemDimensions => InfoValue::Uint(3),
            DeviceInfo::MaxWorkGroupSize => InfoValue::Size(d.max_work_group_size),
            DeviceInfo::MaxWorkItemSizes => InfoValue::Sizes(d.max_work_item_sizes.to_vec()),
            DeviceInfo::MaxClockFrequency => InfoValue::Uint(d.max_clock_frequency),
            DeviceInfo::MaxMemAllocSize => InfoValue::Ulong(d.max_mem_alloc_size),
            DeviceInfo::ImageSupport => InfoValue::Bool(d.image_support),
            DeviceInfo::GlobalMemSize => InfoValue::Ulong(d.global_mem_size),
            DeviceInfo::LocalMemSize => InfoValue::Ulong(d.local_mem_size),
            DeviceInfo::Available => InfoValue::Bool(d.available),
            DeviceInfo::CompilerAvailable => InfoValue::Bool(d.compiler_available),
            DeviceInfo::Name => InfoValue::Text(d.name.clone()),
            DeviceInfo::Vendor => InfoValue::Text(d.vendor.clone()),
            DeviceInfo::DriverVersion => InfoValue::Text(env!("CARGO_PKG_VERSION").to_string()),
            DeviceInfo::Profile => InfoValue::Text(PLATFORM_PROFILE.to_string()),
            DeviceInfo::Version => InfoValue::Text("OpenCL 1.2".to_string()),
            DeviceInfo::Extensions => InfoValue::Text(d.extensions.clone()),
            DeviceInfo::Platform => InfoValue::Handle(PLATFORM_ID),
        })
    }

    fn create_context(&self, devices: &[RawDevice]) -> Result<RawContext> {
        const OP: &str = "clCreateContext";
        let mut state = self.begin(OP)?;
        if devices.is_empty() {
            return Err(ClError::native(OP, Status::InvalidValue));
        }
        let mut unique = Vec::with_capacity(devices.len());
        for &device in devices {
            if !self.device(device, OP)?.available {
                return Err(ClError::native(OP, Status::DeviceNotAvailable));
            }
            if !unique.contains(&device) {
                unique.push(device);
            }
        }
        let id = state.insert(Object::Context { devices: unique });
        log::trace!("sim: created context {:#x}", id);
        Ok(RawContext::from_raw(id))
    }

    fn context_info(&self, context: RawContext, param: ContextInfo) -> Result<InfoValue> {
        const OP: &str = "clGetContextInfo";
        let state = self.begin(OP)?;
        let id = context.as_raw();
        match param {
            ContextInfo::ReferenceCount => state.refcount(id, ObjectKind::Context, OP),
            ContextInfo::Devices => Ok(InfoValue::Handles(
                state
                    .context_devices(id, OP)?
                    .iter()
                    .map(|d| d.as_raw())
                    .collect(),
            )),
            ContextInfo::NumDevices => Ok(InfoValue::Uint(
                state.context_devices(id, OP)?.len() as u32,
            )),
        }
    }

    fn retain_context(&self, context: RawContext) -> Result<()> {
        const OP: &str = "clRetainContext";
        self.begin(OP)?.retain(context.as_raw(), ObjectKind::Context, OP)
    }

    fn release_context(&self, context: RawContext) -> Result<()> {
        const OP: &str = "clReleaseContext";
        self.begin(OP)?.release(context.as_raw(), ObjectKind::Context, OP)
    }

    fn create_program_with_source(&self, context: RawContext, source: &str) -> Result<RawProgram> {
        const OP: &str = "clCreateProgramWithSource";
        let mut state = self.begin(OP)?;
        state.entry(context.as_raw(), ObjectKind::Context, OP)?;
        if source.is_empty() {
            return Err(ClError::native(OP, Status::InvalidValue));
        }
        let id = state.insert(Object::Program {
            context: context.as_raw(),
            source: source.to_string(),
            builds: HashMap::new(),
            kernels: Vec::new(),
            attached_kernels: 0,
        });
        Ok(RawProgram::from_raw(id))
    }

    fn build_program(&self, program: RawProgram, devices: &[RawDevice], options: &str) -> Result<()> {
        const OP: &str = "clBuildProgram";
        let mut state = self.begin(OP)?;
        let id = program.as_raw();

        let (context, attached) = match &state.entry(id, ObjectKind::Program, OP)?.object {
            Object::Program {
                context,
                attached_kernels,
                ..
            } => (*context, *attached_kernels),
            _ => return Err(ClError::native(OP, Status::InvalidProgram)),
        };
        let context_devices = state.context_devices(context, OP)?.to_vec();
        let targets: Vec<RawDevice> = if devices.is_empty() {
            context_devices.clone()
        } else {
            devices.to_vec()
        };
        for device in &targets {
            if !context_devices.contains(device) {
                return Err(ClError::native(OP, Status::InvalidDevice));
            }
            if !self.device(*device, OP)?.compiler_available {
                return Err(ClError::native(OP, Status::CompilerNotAvailable));
            }
        }
        if attached > 0 {
            return Err(ClError::native(OP, Status::InvalidOperation));
        }
        if let Err(reason) = Self::validate_build_options(options) {
            log::debug!("sim: rejected build options '{}': {}", options, reason);
            return Err(ClError::native(OP, Status::InvalidBuildOptions));
        }

        let Some(Entry {
            object: Object::Program {
                source: text,
                builds,
                kernels,
                ..
            },
            ..
        }) = state.objects.get_mut(&id)
        else {
            return Err(ClError::native(OP, Status::InvalidProgram));
        };

        let scanned = source::scan(text);
        let mut failed = false;
        for device in targets {
            let diagnostics = match &scanned {
                Ok(found) => {
                    let max_work_group_size = self.device(device, OP)?.max_work_group_size;
                    source::check_work_group_limit(found, max_work_group_size)
                }
                Err(diagnostics) => diagnostics.clone(),
            };
            let status = if diagnostics.is_empty() {
                BuildStatus::Success
            } else {
                failed = true;
                BuildStatus::Error
            };
            builds.insert(
                device,
                DeviceBuild {
                    status,
                    options: options.to_string(),
                    log: render_log(&diagnostics),
                },
            );
        }

        let built_any = builds.values().any(|b| b.status == BuildStatus::Success);
        match scanned {
            Ok(found) if built_any => *kernels = found,
            _ if !built_any => kernels.clear(),
            _ => {}
        }

        if failed {
            Err(ClError::native(OP, Status::BuildProgramFailure))
        } else {
            log::trace!("sim: built program {:#x} with {} kernel(s)", id, kernels.len());
            Ok(())
        }
    }

    fn program_info(&self, program: RawProgram, param: ProgramInfo) -> Result<InfoValue> {
        const OP: &str = "clGetProgramInfo";
        let state = self.begin(OP)?;
        let id = program.as_raw();
        let entry = state.entry(id, ObjectKind::Program, OP)?;
        let Object::Program {
            context,
            source,
            builds,
            kernels,
            ..
        } = &entry.object
        else {
            return Err(ClError::native(OP, Status::InvalidProgram));
        };
        let built = builds.values().any(|b| b.status == BuildStatus::Success);

        Ok(match param {
            ProgramInfo::ReferenceCount => InfoValue::Uint(entry.refcount),
            ProgramInfo::Context => InfoValue::Handle(*context),
            ProgramInfo::NumDevices => {
                InfoValue::Uint(state.context_devices(*context, OP)?.len() as u32)
            }
            ProgramInfo::Devices => InfoValue::Handles(
                state
                    .context_devices(*context, OP)?
                    .iter()
                    .map(|d| d.as_raw())
                    .collect(),
            ),
            ProgramInfo::Source => InfoValue::Text(source.clone()),
            ProgramInfo::NumKernels | ProgramInfo::KernelNames if !built => {
                return Err(ClError::native(OP, Status::InvalidProgramExecutable));
            }
            ProgramInfo::NumKernels => InfoValue::Size(kernels.len()),
            ProgramInfo::KernelNames => InfoValue::Text(
                kernels
                    .iter()
                    .map(|k| k.name.as_str())
                    .collect::<Vec<_>>()
                    .join(";"),
            ),
        })
    }

    fn program_build_info(
        &self,
        program: RawProgram,
        device: RawDevice,
        param: ProgramBuildInfo,
    ) -> Result<InfoValue> {
        const OP: &str = "clGetProgramBuildInfo";
        let state = self.begin(OP)?;
        let Object::Program {
            context, builds, ..
        } = &state.entry(program.as_raw(), ObjectKind::Program, OP)?.object
        else {
            return Err(ClError::native(OP, Status::InvalidProgram));
        };
        if !state.context_devices(*context, OP)?.contains(&device) {
            return Err(ClError::native(OP, Status::InvalidDevice));
        }

        let build = builds.get(&device);
        Ok(match param {
            ProgramBuildInfo::Status => {
                InfoValue::Int(build.map_or(BuildStatus::None, |b| b.status).code())
            }
            ProgramBuildInfo::Options => {
                InfoValue::Text(build.map(|b| b.options.clone()).unwrap_or_default())
            }
            ProgramBuildInfo::Log => {
                InfoValue::Text(build.map(|b| b.log.clone()).unwrap_or_default())
            }
        })
    }

    fn retain_program(&self, program: RawProgram) -> Result<()> {
        const OP: &str = "clRetainProgram";
        self.begin(OP)?.retain(program.as_raw(), ObjectKind::Program, OP)
    }

    fn release_program(&self, program: RawProgram) -> Result<()> {
        const OP: &str = "clReleaseProgram";
        self.begin(OP)?.release(program.as_raw(), ObjectKind::Program, OP)
    }

    fn create_kernel(&self, program: RawProgram, name: &str) -> Result<RawKernel> {
        const OP: &str = "clCreateKernel";
        let mut state = self.begin(OP)?;
        let id = program.as_raw();
        let Object::Program {
            builds, kernels, ..
        } = &state.entry(id, ObjectKind::Program, OP)?.object
        else {
            return Err(ClError::native(OP, Status::InvalidProgram));
        };
        if !builds.values().any(|b| b.status == BuildStatus::Success) {
            return Err(ClError::native(OP, Status::InvalidProgramExecutable));
        }
        let decl = kernels
            .iter()
            .find(|k| k.name == name)
            .cloned()
            .ok_or_else(|| ClError::native(OP, Status::InvalidKernelName))?;

        let kernel = attach_kernel(&mut state, id, decl);
        Ok(RawKernel::from_raw(kernel))
    }

    fn create_kernels_in_program(&self, program: RawProgram) -> Result<Vec<RawKernel>> {
        const OP: &str = "clCreateKernelsInProgram";
        let mut state = self.begin(OP)?;
        let id = program.as_raw();
        let Object::Program {
            builds, kernels, ..
        } = &state.entry(id, ObjectKind::Program, OP)?.object
        else {
            return Err(ClError::native(OP, Status::InvalidProgram));
        };
        if !builds.values().any(|b| b.status == BuildStatus::Success) {
            return Err(ClError::native(OP, Status::InvalidProgramExecutable));
        }
        let decls = kernels.clone();

        Ok(decls
            .into_iter()
            .map(|decl| RawKernel::from_raw(attach_kernel(&mut state, id, decl)))
            .collect())
    }

    fn set_kernel_arg(&self, kernel: RawKernel, index: u32, arg: KernelArg<'_>) -> Result<()> {
        const OP: &str = "clSetKernelArg";
        let mut state = self.begin(OP)?;
        let id = kernel.as_raw();

        let (program, param_kind) = match &state.entry(id, ObjectKind::Kernel, OP)?.object {
            Object::Kernel { program, decl, .. } => {
                let param = decl
                    .params
                    .get(index as usize)
                    .ok_or_else(|| ClError::native(OP, Status::InvalidArgIndex))?;
                (*program, param.kind.clone())
            }
            _ => return Err(ClError::native(OP, Status::InvalidKernel)),
        };
        let context = state
            .program_context(program)
            .ok_or_else(|| ClError::native(OP, Status::InvalidProgram))?;

        let local_limit = self.local_mem_limit(&state, context, OP)?;
        let bound = Self::bind_arg(&state, context, local_limit, &param_kind, arg)
            .map_err(|status| ClError::native(OP, status))?;

        if let Some(Entry {
            object: Object::Kernel { args, .. },
            ..
        }) = state.objects.get_mut(&id)
        {
            args[index as usize] = Some(bound);
        }
        Ok(())
    }

    fn kernel_info(&self, kernel: RawKernel, param: KernelInfo) -> Result<InfoValue> {
        const OP: &str = "clGetKernelInfo";
        let state = self.begin(OP)?;
        let entry = state.entry(kernel.as_raw(), ObjectKind::Kernel, OP)?;
        let Object::Kernel { program, decl, .. } = &entry.object else {
            return Err(ClError::native(OP, Status::InvalidKernel));
        };
        Ok(match param {
            KernelInfo::FunctionName => InfoValue::Text(decl.name.clone()),
            KernelInfo::NumArgs => InfoValue::Uint(decl.params.len() as u32),
            KernelInfo::ReferenceCount => InfoValue::Uint(entry.refcount),
            KernelInfo::Context => InfoValue::Handle(
                state
                    .program_context(*program)
                    .ok_or_else(|| ClError::native(OP, Status::InvalidProgram))?,
            ),
            KernelInfo::Program => InfoValue::Handle(*program),
            KernelInfo::Attributes => InfoValue::Text(decl.attributes.clone()),
        })
    }

    fn kernel_work_group_info(
        &self,
        kernel: RawKernel,
        device: RawDevice,
        param: KernelWorkGroupInfo,
    ) -> Result<InfoValue> {
        const OP: &str = "clGetKernelWorkGroupInfo";
        let state = self.begin(OP)?;
        let Object::Kernel {
            program,
            decl,
            args,
        } = &state.entry(kernel.as_raw(), ObjectKind::Kernel, OP)?.object
        else {
            return Err(ClError::native(OP, Status::InvalidKernel));
        };
        let context = state
            .program_context(*program)
            .ok_or_else(|| ClError::native(OP, Status::InvalidProgram))?;
        if !state.context_devices(context, OP)?.contains(&device) {
            return Err(ClError::native(OP, Status::InvalidDevice));
        }
        let spec = self.device(device, OP)?;

        Ok(match param {
            KernelWorkGroupInfo::WorkGroupSize => InfoValue::Size(
                decl.required_work_group_total()
                    .unwrap_or(spec.max_work_group_size)
                    .min(spec.max_work_group_size),
            ),
            KernelWorkGroupInfo::CompileWorkGroupSize => {
                InfoValue::Sizes(decl.reqd_work_group_size.unwrap_or([0; 3]).to_vec())
            }
            KernelWorkGroupInfo::LocalMemSize => InfoValue::Ulong(
                args.iter()
                    .filter_map(|arg| match arg {
                        Some(BoundArg::Local(size)) => Some(*size as u64),
                        _ => None,
                    })
                    .fold(0u64, u64::saturating_add),
            ),
            KernelWorkGroupInfo::PreferredWorkGroupSizeMultiple => {
                InfoValue::Size(spec.preferred_work_group_multiple)
            }
            KernelWorkGroupInfo::PrivateMemSize => InfoValue::Ulong(0),
        })
    }

    fn retain_kernel(&self, kernel: RawKernel) -> Result<()> {
        const OP: &str = "clRetainKernel";
        self.begin(OP)?.retain(kernel.as_raw(), ObjectKind::Kernel, OP)
    }

    fn release_kernel(&self, kernel: RawKernel) -> Result<()> {
        const OP: &str = "clReleaseKernel";
        self.begin(OP)?.release(kernel.as_raw(), ObjectKind::Kernel, OP)
    }

    fn create_buffer(
        &self,
        context: RawContext,
        flags: MemFlags,
        size: usize,
        host_data: Option<&[u8]>,
    ) -> Result<RawMem> {
        const OP: &str = "clCreateBuffer";
        let mut state = self.begin(OP)?;
        let devices = state.context_devices(context.as_raw(), OP)?.to_vec();

        if flags.access_flag_count() > 1
            || (flags.contains(MemFlags::USE_HOST_PTR)
                && flags.intersects(MemFlags::ALLOC_HOST_PTR | MemFlags::COPY_HOST_PTR))
        {
            return Err(ClError::native(OP, Status::InvalidValue));
        }
        let max_alloc = devices
            .iter()
            .map(|d| self.device(*d, OP).map(|spec| spec.max_mem_alloc_size))
            .collect::<Result<Vec<u64>>>()?
            .into_iter()
            .min()
            .unwrap_or(0);
        if size == 0 || size as u64 > max_alloc {
            return Err(ClError::native(OP, Status::InvalidBufferSize));
        }

        let data = match (flags.takes_host_data(), host_data) {
            (true, Some(host)) if host.len() >= size => host[..size].to_vec(),
            (false, None) => vec![0; size],
            _ => return Err(ClError::native(OP, Status::InvalidHostPtr)),
        };

        let mut flags = flags;
        if flags.access_flag_count() == 0 {
            flags |= MemFlags::READ_WRITE;
        }
        let id = state.insert(Object::Mem {
            context: context.as_raw(),
            flags,
            data,
        });
        Ok(RawMem::from_raw(id))
    }

    fn mem_info(&self, mem: RawMem, param: MemInfo) -> Result<InfoValue> {
        const OP: &str = "clGetMemObjectInfo";
        let state = self.begin(OP)?;
        let entry = state.entry(mem.as_raw(), ObjectKind::Mem, OP)?;
        let Object::Mem {
            context,
            flags,
            data,
        } = &entry.object
        else {
            return Err(ClError::native(OP, Status::InvalidMemObject));
        };
        Ok(match param {
            MemInfo::Type => InfoValue::Uint(MemObjectType::Buffer.code()),
            MemInfo::Flags => InfoValue::Bitfield(flags.bits()),
            MemInfo::Size => InfoValue::Size(data.len()),
            MemInfo::ReferenceCount => InfoValue::Uint(entry.refcount),
            MemInfo::Context => InfoValue::Handle(*context),
        })
    }

    fn retain_mem(&self, mem: RawMem) -> Result<()> {
        const OP: &str = "clRetainMemObject";
        self.begin(OP)?.retain(mem.as_raw(), ObjectKind::Mem, OP)
    }

    fn release_mem(&self, mem: RawMem) -> Result<()> {
        const OP: &str = "clReleaseMemObject";
        self.begin(OP)?.release(mem.as_raw(), ObjectKind::Mem, OP)
    }

    fn create_sampler(&self, context: RawContext, desc: SamplerDesc) -> Result<RawSampler> {
        const OP: &str = "clCreateSampler";
        let mut state = self.begin(OP)?;
        let devices = state.context_devices(context.as_raw(), OP)?.to_vec();
        let mut image_support = false;
        for device in devices {
            image_support |= self.device(device, OP)?.image_support;
        }
        if !image_support {
            return Err(ClError::native(OP, Status::InvalidOperation));
        }
        let id = state.insert(Object::Sampler {
            context: context.as_raw(),
            desc,
        });
        Ok(RawSampler::from_raw(id))
    }

    fn sampler_info(&self, sampler: RawSampler, param: SamplerInfo) -> Result<InfoValue> {
        const OP: &str = "clGetSamplerInfo";
        let state = self.begin(OP)?;
        let entry = state.entry(sampler.as_raw(), ObjectKind::Sampler, OP)?;
        let Object::Sampler { context, desc } = &entry.object else {
            return Err(ClError::native(OP, Status::InvalidSampler));
        };
        Ok(match param {
            SamplerInfo::ReferenceCount => InfoValue::Uint(entry.refcount),
            SamplerInfo::Context => InfoValue::Handle(*context),
            SamplerInfo::NormalizedCoords => InfoValue::Bool(desc.normalized_coords),
            SamplerInfo::AddressingMode => InfoValue::Uint(desc.addressing_mode.code()),
            SamplerInfo::FilterMode => InfoValue::Uint(desc.filter_mode.code()),
        })
    }

    fn retain_sampler(&self, sampler: RawSampler) -> Result<()> {
        const OP: &str = "clRetainSampler";
        self.begin(OP)?.retain(sampler.as_raw(), ObjectKind::Sampler, OP)
    }

    fn release_sampler(&self, sampler: RawSampler) -> Result<()> {
        const OP: &str = "clReleaseSampler";
        self.begin(OP)?.release(sampler.as_raw(), ObjectKind::Sampler, OP)
    }
}

fn render_log(diagnostics: &[source::Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Inserts a kernel object for `decl` and records it on its program.
fn attach_kernel(state: &mut State, program: usize, decl: KernelDecl) -> usize {
    let args = vec![None; decl.params.len()];
    let id = state.insert(Object::Kernel {
        program,
        decl,
        args,
    });
    if let Some(Entry {
        object: Object::Program { attached_kernels, .. },
        ..
    }) = state.objects.get_mut(&program)
    {
        *attached_kernels += 1;
    }
    id
}
