//! Program creation, build failures and kernel enumeration.

mod common;

use common::{VECTOR_ADD, gpu_session, sim_with};

use clbind::prelude::*;
use clbind::SimDeviceSpec;
use rstest::rstest;

#[test]
fn test_kernel_enumeration() {
    let (_sim, session) = gpu_session();
    let program = session.build_program(VECTOR_ADD).unwrap();
    assert_eq!(program.kernel_names().unwrap(), vec!["vector_add", "block_sum", "blur"]);
    assert_eq!(program.num_kernels().unwrap(), 3);

    let kernels = program.create_all_kernels().unwrap();
    assert_eq!(kernels.len(), 3);
    assert_eq!(kernels[1].attributes().unwrap(), "reqd_work_group_size(64,1,1)");
    assert!(kernels.iter().all(|k| k.program() == &program));
}

#[test]
fn test_unknown_kernel_name() {
    let (_sim, session) = gpu_session();
    let program = session.build_program(VECTOR_ADD).unwrap();
    let err = program.create_kernel("vector_sub").unwrap_err();
    assert!(matches!(
        err,
        ClError::Native {
            operation: "clCreateKernel",
            status: Status::InvalidKernelName
        }
    ));
}

#[test]
fn test_kernel_before_build() {
    let (_sim, session) = gpu_session();
    let program = Program::with_source(session.context(), VECTOR_ADD).unwrap();
    let err = program.create_kernel("vector_add").unwrap_err();
    assert_eq!(err.status(), Some(Status::InvalidProgramExecutable));
}

#[rstest]
#[case::unclosed_body("__kernel void k(__global float* a) {", "never closed")]
#[case::non_void("__kernel float k(__global float* a) { return a[0]; }", "return type must be void")]
#[case::missing_address_space("__kernel void k(float* a) {}", "address space")]
#[case::malformed_attribute(
    "__kernel __attribute__(q b()) void k(__global int* a) {}",
    "malformed attribute"
)]
#[case::oversized_required_group(
    "__kernel __attribute__((reqd_work_group_size(4294967296, 4294967296, 1))) void k(__global int* a) {}",
    "too large"
)]
#[case::required_group_above_device_max(
    "__kernel __attribute__((reqd_work_group_size(64, 32, 1))) void k(__global int* a) {}",
    "device maximum is 1024"
)]
fn test_build_failure_log(#[case] source: &str, #[case] expected: &str) {
    let (_sim, session) = gpu_session();
    let err = session.build_program(source).unwrap_err();
    let ClError::BuildFailed { status, log } = &err else {
        panic!("expected BuildFailed, got {err:?}");
    };
    assert_eq!(*status, Status::BuildProgramFailure);
    assert!(log.contains(expected), "{log}");
    assert!(err.to_string().starts_with("program build failed: CL_BUILD_PROGRAM_FAILURE (-11)"));
}

#[test]
fn test_build_for_subset_of_devices() {
    let (_sim, driver) = sim_with(vec![SimDeviceSpec::gpu("a"), SimDeviceSpec::gpu("b")]);
    let devices = Platform::default(&driver).unwrap().devices(DeviceType::ALL).unwrap();
    let context = Context::new(&devices).unwrap();
    let program = Program::with_source(&context, VECTOR_ADD).unwrap();

    program.build(Some(&devices[1..]), "-cl-std=CL1.2").unwrap();
    assert_eq!(program.build_status(&devices[0]).unwrap(), BuildStatus::None);
    assert_eq!(program.build_status(&devices[1]).unwrap(), BuildStatus::Success);
    assert_eq!(program.build_options(&devices[1]).unwrap(), "-cl-std=CL1.2");
    program.create_kernel("vector_add").unwrap();
}

#[test]
fn test_required_work_group_fails_only_on_small_device() {
    let (_sim, driver) = sim_with(vec![
        SimDeviceSpec::gpu("wide"),
        SimDeviceSpec::gpu("narrow").with_max_work_group_size(32),
    ]);
    let devices = Platform::default(&driver).unwrap().devices(DeviceType::ALL).unwrap();
    let context = Context::new(&devices).unwrap();
    let program = Program::with_source(&context, VECTOR_ADD).unwrap();

    let err = program.build(None, "").unwrap_err();
    let ClError::BuildFailed { log, .. } = &err else {
        panic!("expected BuildFailed, got {err:?}");
    };
    assert!(log.starts_with("[narrow]\n"), "{log}");
    assert!(log.contains("'block_sum'"), "{log}");
    assert!(!log.contains("[wide]"), "{log}");

    assert_eq!(program.build_status(&devices[0]).unwrap(), BuildStatus::Success);
    assert_eq!(program.build_status(&devices[1]).unwrap(), BuildStatus::Error);
    let kernel = program.create_kernel("block_sum").unwrap();
    assert_eq!(kernel.work_group_size(&devices[0]).unwrap(), 64);
}

#[test]
fn test_compiler_unavailable() {
    let (_sim, driver) = sim_with(vec![SimDeviceSpec::gpu("no-cc").with_compiler_available(false)]);
    let session = Session::with_driver(driver, ClConfig::default()).unwrap();
    let err = session.build_program(VECTOR_ADD).unwrap_err();
    assert_eq!(err.status(), Some(Status::CompilerNotAvailable));
}

#[test]
fn test_rebuild_while_kernels_exist() {
    let (_sim, session) = gpu_session();
    let program = session.build_program(VECTOR_ADD).unwrap();
    let kernel = program.create_kernel("vector_add").unwrap();

    let err = program.build(None, "").unwrap_err();
    assert_eq!(err.status(), Some(Status::InvalidOperation));

    drop(kernel);
    program.build(None, "-cl-mad-enable").unwrap();
}

#[rstest]
#[case("-O2")]
#[case("-D")]
#[case("-cl-std=CL4.0")]
fn test_invalid_build_options(#[case] options: &str) {
    let (_sim, session) = gpu_session();
    let err = session
        .build_program_with_options(VECTOR_ADD, options)
        .unwrap_err();
    assert_eq!(err.status(), Some(Status::InvalidBuildOptions));
}
