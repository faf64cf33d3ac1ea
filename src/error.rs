//! Error types and native status translation.
//!
//! Every native entry point reports a `cl_int` status. [`Status`] names each
//! code and [`ClError`] is what the safe wrappers return.

use std::fmt;

use thiserror::Error;

macro_rules! status_codes {
    ($( $variant:ident = $code:literal => $name:literal ),* $(,)?) => {
        /// Native status code returned by an OpenCL entry point.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Status {
            $( $variant, )*
            /// A code outside the Khronos table (vendor extension or garbage).
            Unknown(i32),
        }

        impl Status {
            /// Looks up the status for a raw code.
            pub fn from_code(code: i32) -> Self {
                match code {
                    $( $code => Status::$variant, )*
                    other => Status::Unknown(other),
                }
            }

            /// Raw `cl_int` value.
            pub fn code(self) -> i32 {
                match self {
                    $( Status::$variant => $code, )*
                    Status::Unknown(code) => code,
                }
            }

            /// Canonical `CL_*` name, or `"CL_UNKNOWN_ERROR"`.
            pub fn name(self) -> &'static str {
                match self {
                    $( Status::$variant => $name, )*
                    Status::Unknown(_) => "CL_UNKNOWN_ERROR",
                }
            }
        }
    };
}

status_codes! {
    Success = 0 => "CL_SUCCESS",
    DeviceNotFound = -1 => "CL_DEVICE_NOT_FOUND",
    DeviceNotAvailable = -2 => "CL_DEVICE_NOT_AVAILABLE",
    CompilerNotAvailable = -3 => "CL_COMPILER_NOT_AVAILABLE",
    MemObjectAllocationFailure = -4 => "CL_MEM_OBJECT_ALLOCATION_FAILURE",
    OutOfResources = -5 => "CL_OUT_OF_RESOURCES",
    OutOfHostMemory = -6 => "CL_OUT_OF_HOST_MEMORY",
    ProfilingInfoNotAvailable = -7 => "CL_PROFILING_INFO_NOT_AVAILABLE",
    MemCopyOverlap = -8 => "CL_MEM_COPY_OVERLAP",
    ImageFormatMismatch = -9 => "CL_IMAGE_FORMAT_MISMATCH",
    ImageFormatNotSupported = -10 => "CL_IMAGE_FORMAT_NOT_SUPPORTED",
    BuildProgramFailure = -11 => "CL_BUILD_PROGRAM_FAILURE",
    MapFailure = -12 => "CL_MAP_FAILURE",
    MisalignedSubBufferOffset = -13 => "CL_MISALIGNED_SUB_BUFFER_OFFSET",
    ExecStatusErrorForEventsInWaitList = -14 => "CL_EXEC_STATUS_ERROR_FOR_EVENTS_IN_WAIT_LIST",
    CompileProgramFailure = -15 => "CL_COMPILE_PROGRAM_FAILURE",
    LinkerNotAvailable = -16 => "CL_LINKER_NOT_AVAILABLE",
    LinkProgramFailure = -17 => "CL_LINK_PROGRAM_FAILURE",
    DevicePartitionFailed = -18 => "CL_DEVICE_PARTITION_FAILED",
    KernelArgInfoNotAvailable = -19 => "CL_KERNEL_ARG_INFO_NOT_AVAILABLE",
    InvalidValue = -30 => "CL_INVALID_VALUE",
    InvalidDeviceType = -31 => "CL_INVALID_DEVICE_TYPE",
    InvalidPlatform = -32 => "CL_INVALID_PLATFORM",
    InvalidDevice = -33 => "CL_INVALID_DEVICE",
    InvalidContext = -34 => "CL_INVALID_CONTEXT",
    InvalidQueueProperties = -35 => "CL_INVALID_QUEUE_PROPERTIES",
    InvalidCommandQueue = -36 => "CL_INVALID_COMMAND_QUEUE",
    InvalidHostPtr = -37 => "CL_INVALID_HOST_PTR",
    InvalidMemObject = -38 => "CL_INVALID_MEM_OBJECT",
    InvalidImageFormatDescriptor = -39 => "CL_INVALID_IMAGE_FORMAT_DESCRIPTOR",
    InvalidImageSize = -40 => "CL_INVALID_IMAGE_SIZE",
    InvalidSampler = -41 => "CL_INVALID_SAMPLER",
    InvalidBinary = -42 => "CL_INVALID_BINARY",
    InvalidBuildOptions = -43 => "CL_INVALID_BUILD_OPTIONS",
    InvalidProgram = -44 => "CL_INVALID_PROGRAM",
    InvalidProgramExecutable = -45 => "CL_INVALID_PROGRAM_EXECUTABLE",
    InvalidKernelName = -46 => "CL_INVALID_KERNEL_NAME",
    InvalidKernelDefinition = -47 => "CL_INVALID_KERNEL_DEFINITION",
    InvalidKernel = -48 => "CL_INVALID_KERNEL",
    InvalidArgIndex = -49 => "CL_INVALID_ARG_INDEX",
    InvalidArgValue = -50 => "CL_INVALID_ARG_VALUE",
    InvalidArgSize = -51 => "CL_INVALID_ARG_SIZE",
    InvalidKernelArgs = -52 => "CL_INVALID_KERNEL_ARGS",
    InvalidWorkDimension = -53 => "CL_INVALID_WORK_DIMENSION",
    InvalidWorkGroupSize = -54 => "CL_INVALID_WORK_GROUP_SIZE",
    InvalidWorkItemSize = -55 => "CL_INVALID_WORK_ITEM_SIZE",
    InvalidGlobalOffset = -56 => "CL_INVALID_GLOBAL_OFFSET",
    InvalidEventWaitList = -57 => "CL_INVALID_EVENT_WAIT_LIST",
    InvalidEvent = -58 => "CL_INVALID_EVENT",
    InvalidOperation = -59 => "CL_INVALID_OPERATION",
    InvalidGlObject = -60 => "CL_INVALID_GL_OBJECT",
    InvalidBufferSize = -61 => "CL_INVALID_BUFFER_SIZE",
    InvalidMipLevel = -62 => "CL_INVALID_MIP_LEVEL",
    InvalidGlobalWorkSize = -63 => "CL_INVALID_GLOBAL_WORK_SIZE",
    InvalidProperty = -64 => "CL_INVALID_PROPERTY",
    InvalidImageDescriptor = -65 => "CL_INVALID_IMAGE_DESCRIPTOR",
    InvalidCompilerOptions = -66 => "CL_INVALID_COMPILER_OPTIONS",
    InvalidLinkerOptions = -67 => "CL_INVALID_LINKER_OPTIONS",
    InvalidDevicePartitionCount = -68 => "CL_INVALID_DEVICE_PARTITION_COUNT",
    InvalidPipeSize = -69 => "CL_INVALID_PIPE_SIZE",
    InvalidDeviceQueue = -70 => "CL_INVALID_DEVICE_QUEUE",
    InvalidSpecId = -71 => "CL_INVALID_SPEC_ID",
    MaxSizeRestrictionExceeded = -72 => "CL_MAX_SIZE_RESTRICTION_EXCEEDED",
}

impl Status {
    pub fn is_success(self) -> bool {
        self == Status::Success
    }

    /// Turns a raw status into `Ok(())` or a [`ClError::Native`] tagged with
    /// the entry point that produced it.
    pub fn check(code: i32, operation: &'static str) -> Result<()> {
        match Status::from_code(code) {
            Status::Success => Ok(()),
            status => Err(ClError::Native { operation, status }),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

impl From<i32> for Status {
    fn from(code: i32) -> Self {
        Status::from_code(code)
    }
}

/// Error returned by every fallible operation in this crate.
#[derive(Debug, Clone, Error)]
pub enum ClError {
    /// A native entry point returned a non-success status.
    #[error("{operation} failed: {status}")]
    Native {
        operation: &'static str,
        status: Status,
    },

    /// Program build failed; `log` holds the build log of every failing device.
    #[error("program build failed: {status}\n{log}")]
    BuildFailed { status: Status, log: String },

    /// The driver answered an info query with a value of the wrong shape.
    #[error("unexpected value for {param}: expected {expected}")]
    UnexpectedInfo {
        param: &'static str,
        expected: &'static str,
    },

    /// Rejected before reaching the driver.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No OpenCL platform found")]
    NoPlatform,

    #[error("No OpenCL device of type {device_type} found")]
    NoDevice { device_type: String },

    #[error("Device index {index} out of range (available: {available})")]
    DeviceIndex { index: usize, available: usize },

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClError {
    /// Shorthand for a native failure.
    pub fn native(operation: &'static str, status: Status) -> Self {
        ClError::Native { operation, status }
    }

    /// Native status carried by this error, if any.
    pub fn status(&self) -> Option<Status> {
        match self {
            ClError::Native { status, .. } | ClError::BuildFailed { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, Status::Success, "CL_SUCCESS")]
    #[case(-5, Status::OutOfResources, "CL_OUT_OF_RESOURCES")]
    #[case(-11, Status::BuildProgramFailure, "CL_BUILD_PROGRAM_FAILURE")]
    #[case(-46, Status::InvalidKernelName, "CL_INVALID_KERNEL_NAME")]
    #[case(-48, Status::InvalidKernel, "CL_INVALID_KERNEL")]
    #[case(-49, Status::InvalidArgIndex, "CL_INVALID_ARG_INDEX")]
    #[case(-51, Status::InvalidArgSize, "CL_INVALID_ARG_SIZE")]
    #[case(-72, Status::MaxSizeRestrictionExceeded, "CL_MAX_SIZE_RESTRICTION_EXCEEDED")]
    fn test_status_table(#[case] code: i32, #[case] status: Status, #[case] name: &str) {
        assert_eq!(Status::from_code(code), status);
        assert_eq!(status.code(), code);
        assert_eq!(status.name(), name);
    }

    #[rstest]
    #[case(-20)]
    #[case(-1001)]
    #[case(42)]
    fn test_unknown_codes_round_trip(#[case] code: i32) {
        let status = Status::from_code(code);
        assert_eq!(status, Status::Unknown(code));
        assert_eq!(status.code(), code);
        assert_eq!(status.name(), "CL_UNKNOWN_ERROR");
    }

    #[test]
    fn test_check() {
        assert!(Status::check(0, "clFinish").is_ok());

        let err = Status::check(-48, "clSetKernelArg").unwrap_err();
        assert_eq!(err.status(), Some(Status::InvalidKernel));
        assert_eq!(
            err.to_string(),
            "clSetKernelArg failed: CL_INVALID_KERNEL (-48)"
        );
    }

    #[test]
    fn test_status_only_on_native_errors() {
        assert_eq!(ClError::NoPlatform.status(), None);
        let err = ClError::BuildFailed {
            status: Status::BuildProgramFailure,
            log: String::new(),
        };
        assert_eq!(err.status(), Some(Status::BuildProgramFailure));
    }
}
