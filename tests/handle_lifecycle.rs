//! Reference counting across the wrapper types.

mod common;

use common::{VECTOR_ADD, gpu_session, sim};

use clbind::prelude::*;
use clbind::{Handle, handle::KernelKind};

#[test]
fn test_whole_object_graph_is_released() {
    let (sim, session) = gpu_session();
    {
        let program = session.build_program(VECTOR_ADD).unwrap();
        let mut kernel = program.create_kernel("vector_add").unwrap();
        let a = Buffer::from_slice(session.context(), MemFlags::READ_ONLY, &[1.0f32; 16]).unwrap();
        kernel.set_mem_arg(0, &a).unwrap();
        let sampler = Sampler::create(session.context(), SamplerDesc::default()).unwrap();
        assert!(sim.live_objects() >= 5);
        drop((kernel, a, sampler, program));
    }
    // Only the session's context remains.
    assert_eq!(sim.live_objects(), 1);
    drop(session);
    assert_eq!(sim.live_objects(), 0);
}

#[test]
fn test_drop_order_does_not_matter() {
    let (sim, session) = gpu_session();
    let context = session.context().clone();
    let program = session.build_program(VECTOR_ADD).unwrap();
    let kernel = program.create_kernel("block_sum").unwrap();

    // Parents go first; the kernel keeps them alive.
    drop(session);
    drop(context);
    drop(program);
    assert_eq!(kernel.function_name(), "block_sum");
    assert_eq!(kernel.num_args().unwrap(), 3);
    assert!(kernel.context().reference_count().unwrap() >= 1);

    drop(kernel);
    assert_eq!(sim.live_objects(), 0);
}

#[test]
fn test_reference_counts_follow_clones() {
    let (_sim, session) = gpu_session();
    let program = session.build_program(VECTOR_ADD).unwrap();
    assert_eq!(program.reference_count().unwrap(), 1);

    let copies: Vec<Program> = (0..3).map(|_| program.clone()).collect();
    assert_eq!(program.reference_count().unwrap(), 4);
    assert!(copies.iter().all(|p| *p == program));

    drop(copies);
    assert_eq!(program.reference_count().unwrap(), 1);
}

#[test]
fn test_explicit_release_surfaces_status() {
    let (sim, session) = gpu_session();
    let program = session.build_program(VECTOR_ADD).unwrap();
    let kernel = program.create_kernel("vector_add").unwrap();

    sim.fail_next("clReleaseKernel", Status::OutOfHostMemory);
    let err = kernel.release().unwrap_err();
    assert_eq!(err.status(), Some(Status::OutOfHostMemory));
    assert_eq!(err.to_string(), "clReleaseKernel failed: CL_OUT_OF_HOST_MEMORY (-6)");
}

#[test]
fn test_failed_release_in_drop_does_not_panic() {
    let (sim, session) = gpu_session();
    let buffer = Buffer::create(session.context(), MemFlags::READ_WRITE, 256).unwrap();
    sim.fail_next("clReleaseMemObject", Status::InvalidMemObject);
    drop(buffer);
    // The buffer leaked on the driver side, nothing else happened.
    assert_eq!(sim.live_objects(), 2);
}

#[test]
fn test_try_clone_reports_retain_failure() {
    let (sim, driver) = sim();
    let session = Session::with_driver(
        driver,
        ClConfig::default().with_driver(DriverKind::Sim),
    )
    .unwrap();
    let program = session.build_program(VECTOR_ADD).unwrap();
    let kernel = program.create_kernel("vector_add").unwrap();

    let handle: Handle<KernelKind> =
        Handle::retained(kernel.driver().clone(), kernel.raw()).unwrap();
    sim.fail_next("clRetainKernel", Status::OutOfResources);
    let err = handle.try_clone().unwrap_err();
    assert_eq!(err.status(), Some(Status::OutOfResources));
    assert_eq!(kernel.reference_count().unwrap(), 2);
}

#[test]
fn test_handles_are_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Context>();
    assert_send_sync::<Program>();
    assert_send_sync::<Kernel>();
    assert_send_sync::<Buffer>();
    assert_send_sync::<Sampler>();
    assert_send_sync::<Session>();
}

#[test]
fn test_queries_from_threads() {
    let (_sim, session) = gpu_session();
    let program = session.build_program(VECTOR_ADD).unwrap();

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let program = program.clone();
            scope.spawn(move || {
                let kernel = program.create_kernel("vector_add").unwrap();
                assert_eq!(kernel.num_args().unwrap(), 4);
            });
        }
    });
    assert_eq!(program.reference_count().unwrap(), 1);
}
