//! Programs: source, build and kernel enumeration.

use std::sync::Arc;

use crate::context::Context;
use crate::device::Device;
use crate::driver::{Driver, ProgramBuildInfo, ProgramInfo, RawDevice, RawProgram};
use crate::error::{ClError, Result, Status};
use crate::handle::{Handle, ProgramKind};
use crate::kernel::Kernel;
use crate::types::BuildStatus;

/// A program object. `Clone` retains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    handle: Handle<ProgramKind>,
    context: Context,
}

impl Program {
    /// Creates an unbuilt program from OpenCL C source.
    pub fn with_source(context: &Context, source: &str) -> Result<Self> {
        if source.is_empty() {
            return Err(ClError::InvalidArgument("program source is empty".into()));
        }
        let driver = Arc::clone(context.driver());
        let raw = driver.create_program_with_source(context.raw(), source)?;
        log::debug!("Created program {:?} ({} bytes of source)", raw, source.len());
        Ok(Self {
            handle: Handle::from_owned(driver, raw),
            context: context.clone(),
        })
    }

    /// Wraps a program reference returned by a query (retains it).
    pub(crate) fn retained(context: Context, raw: RawProgram) -> Result<Self> {
        let handle = Handle::retained(Arc::clone(context.driver()), raw)?;
        Ok(Self { handle, context })
    }

    /// Builds for `devices`, or every device of the context when `None`.
    ///
    /// A compile error comes back as [`ClError::BuildFailed`] carrying the
    /// build log of each device that failed.
    pub fn build(&self, devices: Option<&[Device]>, options: &str) -> Result<()> {
        let targets: Vec<RawDevice> = devices
            .unwrap_or(self.context.devices())
            .iter()
            .map(Device::raw)
            .collect();
        log::debug!(
            "Building program {:?} for {} device(s) with options '{}'",
            self.raw(),
            targets.len(),
            options
        );

        match self.driver().build_program(self.raw(), &targets, options) {
            Ok(()) => Ok(()),
            Err(e) if e.status() == Some(Status::BuildProgramFailure) => {
                let log = self.failure_logs(&targets);
                log::debug!("Build of program {:?} failed:\n{}", self.raw(), log);
                Err(ClError::BuildFailed {
                    status: Status::BuildProgramFailure,
                    log,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Joined build logs of the devices whose build did not succeed.
    fn failure_logs(&self, targets: &[RawDevice]) -> String {
        let mut sections = Vec::new();
        for raw in targets {
            let device = Device::from_raw(Arc::clone(self.driver()), *raw);
            if matches!(self.build_status(&device), Ok(BuildStatus::Success)) {
                continue;
            }
            let name = device.name().unwrap_or_else(|_| format!("{:?}", raw));
            let log = self
                .build_log(&device)
                .unwrap_or_else(|e| format!("<build log unavailable: {}>", e));
            sections.push(format!("[{}]\n{}", name, log.trim_end()));
        }
        sections.join("\n")
    }

    pub fn raw(&self) -> RawProgram {
        self.handle.raw()
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        self.handle.driver()
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn build_status(&self, device: &Device) -> Result<BuildStatus> {
        let code = self
            .driver()
            .program_build_info(self.raw(), device.raw(), ProgramBuildInfo::Status)?
            .into_int(ProgramBuildInfo::Status.label())?;
        BuildStatus::from_code(code).ok_or(ClError::UnexpectedInfo {
            param: ProgramBuildInfo::Status.label(),
            expected: "cl_build_status",
        })
    }

    pub fn build_log(&self, device: &Device) -> Result<String> {
        self.driver()
            .program_build_info(self.raw(), device.raw(), ProgramBuildInfo::Log)?
            .into_text(ProgramBuildInfo::Log.label())
    }

    pub fn build_options(&self, device: &Device) -> Result<String> {
        self.driver()
            .program_build_info(self.raw(), device.raw(), ProgramBuildInfo::Options)?
            .into_text(ProgramBuildInfo::Options.label())
    }

    pub fn source(&self) -> Result<String> {
        self.driver()
            .program_info(self.raw(), ProgramInfo::Source)?
            .into_text(ProgramInfo::Source.label())
    }

    /// Kernel names declared in the built program.
    pub fn kernel_names(&self) -> Result<Vec<String>> {
        let names = self
            .driver()
            .program_info(self.raw(), ProgramInfo::KernelNames)?
            .into_text(ProgramInfo::KernelNames.label())?;
        Ok(names
            .split(';')
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect())
    }

    pub fn num_kernels(&self) -> Result<usize> {
        self.driver()
            .program_info(self.raw(), ProgramInfo::NumKernels)?
            .into_size(ProgramInfo::NumKernels.label())
    }

    pub fn devices(&self) -> Result<Vec<Device>> {
        Ok(self
            .driver()
            .program_info(self.raw(), ProgramInfo::Devices)?
            .into_handles(ProgramInfo::Devices.label())?
            .into_iter()
            .map(|raw| Device::from_raw(Arc::clone(self.driver()), RawDevice::from_raw(raw)))
            .collect())
    }

    pub fn reference_count(&self) -> Result<u32> {
        self.driver()
            .program_info(self.raw(), ProgramInfo::ReferenceCount)?
            .into_uint(ProgramInfo::ReferenceCount.label())
    }

    pub fn create_kernel(&self, name: &str) -> Result<Kernel> {
        Kernel::create(self, name)
    }

    /// One kernel object per kernel declared in the program.
    pub fn create_all_kernels(&self) -> Result<Vec<Kernel>> {
        let raws = self.driver().create_kernels_in_program(self.raw())?;
        // Own every returned reference before anything can fail.
        let handles: Vec<_> = raws
            .into_iter()
            .map(|raw| Handle::from_owned(Arc::clone(self.driver()), raw))
            .collect();
        handles
            .into_iter()
            .map(|handle| Kernel::from_handle(self.clone(), handle))
            .collect()
    }

    /// Releases the program's reference now.
    pub fn release(self) -> Result<()> {
        self.handle.release()
    }
}
