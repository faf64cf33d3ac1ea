//! Native OpenCL driver tests
//!
//! Run with: `cargo test --features opencl`

#![cfg(feature = "opencl")]

mod common;

use common::init_logger;

use clbind::prelude::*;

fn setup_native() -> Option<Session> {
    init_logger();
    match Session::with_config(ClConfig::default().with_driver(DriverKind::Native)) {
        Ok(session) => Some(session),
        Err(e) => {
            eprintln!("OpenCL device not available: {:?}", e);
            None
        }
    }
}

const SCALE: &str = r#"
    __kernel void scale(__global float* data, const float factor) {
        data[get_global_id(0)] *= factor;
    }
"#;

#[test]
fn test_native_device_queries() {
    let Some(session) = setup_native() else {
        return;
    };
    let device = session.device();
    assert!(!session.device_name().is_empty());
    assert!(device.max_work_group_size().unwrap() >= 1);
    assert!(!device.max_work_item_sizes().unwrap().is_empty());
    assert!(!session.platform().name().unwrap().is_empty());
}

#[test]
fn test_native_kernel_lifecycle() {
    let Some(session) = setup_native() else {
        return;
    };
    let program = session.build_program(SCALE).unwrap();
    assert_eq!(program.kernel_names().unwrap(), vec!["scale"]);

    let data = Buffer::from_slice(session.context(), MemFlags::READ_WRITE, &[1.0f32; 256]).unwrap();
    let mut kernel = program.create_kernel("scale").unwrap();
    assert_eq!(kernel.function_name(), "scale");
    assert_eq!(kernel.num_args().unwrap(), 2);
    kernel.set_mem_arg(0, &data).unwrap();
    kernel.set_value_arg(1, &2.0f32).unwrap();

    assert!(kernel.work_group_size(session.device()).unwrap() >= 1);
    assert_eq!(kernel.compile_work_group_size(session.device()).unwrap(), [0, 0, 0]);
    assert_eq!(kernel.query_program().unwrap(), program);
    kernel.release().unwrap();
}

#[test]
fn test_native_build_failure() {
    let Some(session) = setup_native() else {
        return;
    };
    let err = session.build_program("__kernel void broken(").unwrap_err();
    assert_eq!(err.status(), Some(Status::BuildProgramFailure));
}
