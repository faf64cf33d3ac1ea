//! Argument binding against declared kernel parameters.

mod common;

use common::{VECTOR_ADD, gpu_session};

use bytemuck::{Pod, Zeroable};
use clbind::prelude::*;
use clbind::KernelArg;
use rstest::rstest;

#[repr(C)]
#[derive(Debug, Clone, Copy, Zeroable, Pod)]
struct Float2 {
    x: f32,
    y: f32,
}

#[test]
fn test_bind_vector_add() {
    let (_sim, session) = gpu_session();
    let program = session.build_program(VECTOR_ADD).unwrap();
    let context = session.context();

    let a = Buffer::from_slice(context, MemFlags::READ_ONLY, &[1.0f32; 1024]).unwrap();
    let b = Buffer::from_slice(context, MemFlags::READ_ONLY, &[2.0f32; 1024]).unwrap();
    let c = Buffer::create(context, MemFlags::WRITE_ONLY, 1024 * 4).unwrap();

    let mut kernel = program.create_kernel("vector_add").unwrap();
    kernel.set_mem_arg(0, &a).unwrap();
    kernel.set_mem_arg(1, &b).unwrap();
    kernel.set_mem_arg(2, &c).unwrap();
    kernel.set_value_arg(3, &1024u32).unwrap();

    // Rebinding replaces the previous argument.
    kernel.set_mem_arg(2, &a).unwrap();
}

#[test]
fn test_bind_image_kernel() {
    let (_sim, session) = gpu_session();
    let program = session.build_program(VECTOR_ADD).unwrap();
    let sampler = Sampler::create(session.context(), SamplerDesc::default()).unwrap();
    let out = Buffer::create(session.context(), MemFlags::WRITE_ONLY, 64).unwrap();

    let mut blur = program.create_kernel("blur").unwrap();
    blur.set_sampler_arg(1, &sampler).unwrap();
    blur.set_mem_arg(2, &out).unwrap();
    blur.set_value_arg(3, &Float2 { x: 0.5, y: 0.5 }).unwrap();

    let err = blur.set_mem_arg(1, &out).unwrap_err();
    assert_eq!(err.status(), Some(Status::InvalidSampler));
}

#[rstest]
#[case::index_out_of_range(4, KernelArg::Value(&[0; 4]), Status::InvalidArgIndex)]
#[case::scalar_too_wide(3, KernelArg::Value(&[0; 8]), Status::InvalidArgSize)]
#[case::scalar_empty(3, KernelArg::Value(&[]), Status::InvalidArgSize)]
#[case::local_for_scalar(3, KernelArg::Local(16), Status::InvalidArgValue)]
#[case::local_for_global(0, KernelArg::Local(16), Status::InvalidArgValue)]
#[case::non_null_value_for_global(0, KernelArg::Value(&[1, 0, 0, 0, 0, 0, 0, 0]), Status::InvalidMemObject)]
fn test_rejected_vector_add_args(
    #[case] index: u32,
    #[case] arg: KernelArg<'static>,
    #[case] expected: Status,
) {
    let (_sim, session) = gpu_session();
    let program = session.build_program(VECTOR_ADD).unwrap();
    let mut kernel = program.create_kernel("vector_add").unwrap();

    let err = kernel.set_arg(index, arg).unwrap_err();
    assert!(
        matches!(err, ClError::Native { operation: "clSetKernelArg", status } if status == expected),
        "{err}"
    );
}

#[rstest]
#[case(0, Some(Status::InvalidArgSize))]
#[case(256, None)]
#[case(48 << 10, None)]
#[case((48 << 10) + 1, Some(Status::InvalidArgSize))]
#[case(usize::MAX, Some(Status::InvalidArgSize))]
fn test_local_arg_size(#[case] size: usize, #[case] expected: Option<Status>) {
    let (_sim, session) = gpu_session();
    let program = session.build_program(VECTOR_ADD).unwrap();
    let mut kernel = program.create_kernel("block_sum").unwrap();

    let status = kernel.set_local_arg(1, size).err().and_then(|e| e.status());
    assert_eq!(status, expected);
}

#[test]
fn test_buffer_from_other_context_is_rejected() {
    let (_sim, session) = gpu_session();
    let program = session.build_program(VECTOR_ADD).unwrap();
    let other = Context::from_device(session.device()).unwrap();
    let foreign = Buffer::create(&other, MemFlags::READ_WRITE, 64).unwrap();

    let mut kernel = program.create_kernel("vector_add").unwrap();
    let err = kernel.set_mem_arg(0, &foreign).unwrap_err();
    assert_eq!(err.status(), Some(Status::InvalidMemObject));
}

#[test]
fn test_released_buffer_is_rejected() {
    let (_sim, session) = gpu_session();
    let program = session.build_program(VECTOR_ADD).unwrap();
    let buffer = Buffer::create(session.context(), MemFlags::READ_WRITE, 64).unwrap();
    let raw = buffer.raw();
    buffer.release().unwrap();

    let mut kernel = program.create_kernel("vector_add").unwrap();
    let err = kernel.set_arg(0, KernelArg::Mem(raw)).unwrap_err();
    assert_eq!(err.status(), Some(Status::InvalidMemObject));
}
