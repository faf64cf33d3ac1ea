//! clbind: safe handles over the OpenCL compute API
//!
//! clbind wraps the native OpenCL object model (platforms, devices, contexts,
//! programs, kernels, buffers, samplers) in reference-counted Rust types.
//! Every operation forwards synchronously to the driver and native status
//! codes come back as [`ClError`].
//!
//! # Architecture
//!
//! - **handle**: `Handle<K>`, one owned native reference (clone retains, drop releases)
//! - **driver**: the `Driver` trait, the only place native calls happen
//! - **platform / device / context / program / kernel / memory / sampler**:
//!   typed wrappers, one per native object kind
//! - **session**: platform, device and context opened from [`ClConfig`]
//!
//! Two drivers implement the seam:
//! - `SimDriver`: in-process object model, always available
//! - `NativeDriver`: the system ICD loader (feature: `opencl`)
//!
//! # Feature Flags
//!
//! - `opencl`: link the native driver through `cl3`
//!
//! # Example
//!
//! ```
//! use clbind::prelude::*;
//!
//! let config = ClConfig::default().with_driver(DriverKind::Sim);
//! let session = Session::with_config(config)?;
//! let program = session.build_program(
//!     "__kernel void scale(__global float* v, float f) { v[get_global_id(0)] *= f; }",
//! )?;
//!
//! let data = Buffer::from_slice(session.context(), MemFlags::READ_WRITE, &[1.0f32; 64])?;
//! let mut kernel = program.create_kernel("scale")?;
//! kernel.set_mem_arg(0, &data)?;
//! kernel.set_value_arg(1, &2.0f32)?;
//! assert!(kernel.work_group_size(session.device())? > 0);
//! # Ok::<(), clbind::ClError>(())
//! ```

// ============================================================================
// Core Modules
// ============================================================================

pub mod config;
pub mod driver;
pub mod error;
pub mod handle;
pub mod types;

// ============================================================================
// Object Wrappers
// ============================================================================

pub mod context;
pub mod device;
pub mod kernel;
pub mod memory;
pub mod platform;
pub mod program;
pub mod sampler;
pub mod session;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::{ClConfig, DriverKind};
pub use context::Context;
pub use device::Device;
pub use driver::{Driver, KernelArg, SimDeviceSpec, SimDriver};
pub use error::{ClError, Result, Status};
pub use handle::Handle;
pub use kernel::Kernel;
pub use memory::Buffer;
pub use platform::Platform;
pub use program::Program;
pub use sampler::Sampler;
pub use session::Session;
pub use types::{
    AddressingMode, BuildStatus, DeviceType, FilterMode, MemFlags, MemObjectType, SamplerDesc,
};

#[cfg(feature = "opencl")]
pub use driver::NativeDriver;

// ============================================================================
// Prelude
// ============================================================================

/// Prelude module with commonly used types and traits
pub mod prelude {
    pub use crate::config::{ClConfig, DriverKind};
    pub use crate::error::{ClError, Result, Status};
    pub use crate::types::{
        AddressingMode, BuildStatus, DeviceType, FilterMode, MemFlags, SamplerDesc,
    };
    pub use crate::{Buffer, Context, Device, Kernel, Platform, Program, Sampler, Session};
}
