//! Work-group limits reported per device.

mod common;

use common::{VECTOR_ADD, sim_with};

use clbind::prelude::*;
use clbind::SimDeviceSpec;
use rstest::rstest;

fn program_on(specs: Vec<SimDeviceSpec>) -> (Vec<Device>, Program) {
    let (_sim, driver) = sim_with(specs);
    let devices = Platform::default(&driver).unwrap().devices(DeviceType::ALL).unwrap();
    let context = Context::new(&devices).unwrap();
    let program = Program::with_source(&context, VECTOR_ADD).unwrap();
    program.build(None, "").unwrap();
    (devices, program)
}

#[rstest]
#[case::gpu(SimDeviceSpec::gpu("gpu"), 1024, 32)]
#[case::small_gpu(SimDeviceSpec::gpu("small").with_max_work_group_size(256).with_preferred_work_group_multiple(64), 256, 64)]
#[case::cpu(SimDeviceSpec::cpu("cpu"), 8192, 1)]
fn test_limits_follow_device(
    #[case] spec: SimDeviceSpec,
    #[case] max_size: usize,
    #[case] multiple: usize,
) {
    let (devices, program) = program_on(vec![spec]);
    let device = &devices[0];
    let kernel = program.create_kernel("vector_add").unwrap();

    assert_eq!(device.max_work_group_size().unwrap(), max_size);
    assert_eq!(kernel.work_group_size(device).unwrap(), max_size);
    assert_eq!(kernel.preferred_work_group_size_multiple(device).unwrap(), multiple);
    assert_eq!(kernel.compile_work_group_size(device).unwrap(), [0, 0, 0]);
    assert_eq!(kernel.private_mem_size(device).unwrap(), 0);
}

#[test]
fn test_required_work_group_size() {
    let (devices, program) = program_on(vec![SimDeviceSpec::gpu("gpu"), SimDeviceSpec::cpu("cpu")]);
    let kernel = program.create_kernel("block_sum").unwrap();
    for device in &devices {
        assert_eq!(kernel.work_group_size(device).unwrap(), 64);
        assert_eq!(kernel.compile_work_group_size(device).unwrap(), [64, 1, 1]);
    }
}

#[test]
fn test_local_mem_accumulates_bound_args() {
    let (devices, program) = program_on(vec![SimDeviceSpec::gpu("gpu")]);
    let device = &devices[0];
    let mut kernel = program.create_kernel("block_sum").unwrap();

    assert_eq!(kernel.local_mem_size(device).unwrap(), 0);
    kernel.set_local_arg(1, 64 * 4).unwrap();
    assert_eq!(kernel.local_mem_size(device).unwrap(), 256);
    kernel.set_local_arg(1, 128).unwrap();
    assert_eq!(kernel.local_mem_size(device).unwrap(), 128);

    // A rejected size leaves the previous binding in place.
    assert!(kernel.set_local_arg(1, usize::MAX).is_err());
    assert_eq!(kernel.local_mem_size(device).unwrap(), 128);
}

#[test]
fn test_local_limit_is_largest_context_device() {
    let (devices, program) = program_on(vec![SimDeviceSpec::gpu("gpu"), SimDeviceSpec::cpu("cpu")]);
    let mut kernel = program.create_kernel("block_sum").unwrap();

    // 48 KiB fits the GPU even though the CPU only has 32 KiB.
    kernel.set_local_arg(1, 48 << 10).unwrap();
    assert_eq!(kernel.local_mem_size(&devices[0]).unwrap(), 48 << 10);
    let err = kernel.set_local_arg(1, (48 << 10) + 1).unwrap_err();
    assert_eq!(err.status(), Some(Status::InvalidArgSize));
}

#[test]
fn test_device_outside_context() {
    let (_sim, driver) = sim_with(vec![SimDeviceSpec::gpu("in"), SimDeviceSpec::gpu("out")]);
    let devices = Platform::default(&driver).unwrap().devices(DeviceType::ALL).unwrap();
    let context = Context::from_device(&devices[0]).unwrap();
    let program = Program::with_source(&context, VECTOR_ADD).unwrap();
    program.build(None, "").unwrap();
    let kernel = program.create_kernel("vector_add").unwrap();

    assert!(kernel.work_group_size(&devices[0]).is_ok());
    let err = kernel.work_group_size(&devices[1]).unwrap_err();
    assert!(matches!(
        err,
        ClError::Native {
            operation: "clGetKernelWorkGroupInfo",
            status: Status::InvalidDevice
        }
    ));
}
