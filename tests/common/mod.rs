//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use clbind::prelude::*;
use clbind::{Driver, SimDeviceSpec, SimDriver};

pub const VECTOR_ADD: &str = r#"
    __kernel void vector_add(__global const float* a,
                             __global const float* b,
                             __global float* c,
                             const uint n) {
        size_t i = get_global_id(0);
        if (i < n) {
            c[i] = a[i] + b[i];
        }
    }

    __kernel __attribute__((reqd_work_group_size(64, 1, 1)))
    void block_sum(__global const float* input,
                   __local float* scratch,
                   __global float* partial) {
        scratch[get_local_id(0)] = input[get_global_id(0)];
        barrier(CLK_LOCAL_MEM_FENCE);
    }

    __kernel void blur(__read_only image2d_t src, sampler_t smp, __global float4* dst, float2 scale) {
    }
"#;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A simulated driver with the default GPU and CPU devices.
pub fn sim() -> (Arc<SimDriver>, Arc<dyn Driver>) {
    init_logger();
    let sim = Arc::new(SimDriver::new());
    let driver: Arc<dyn Driver> = sim.clone();
    (sim, driver)
}

/// Simulated driver over the given devices.
pub fn sim_with(devices: Vec<SimDeviceSpec>) -> (Arc<SimDriver>, Arc<dyn Driver>) {
    init_logger();
    let sim = Arc::new(SimDriver::with_devices(devices));
    let driver: Arc<dyn Driver> = sim.clone();
    (sim, driver)
}

/// GPU session on a fresh simulated driver.
pub fn gpu_session() -> (Arc<SimDriver>, Session) {
    let (sim, driver) = sim();
    let config = ClConfig::default()
        .with_driver(DriverKind::Sim)
        .with_device_type(DeviceType::GPU);
    let session = Session::with_driver(driver, config).expect("simulated session");
    (sim, session)
}
