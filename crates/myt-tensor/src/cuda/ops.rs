// CUDA registrations of the scalar operators. The data is staged through
// host memory and computed with the shared elementwise kernels.

use std::cell::Cell;

use crate::cpu::elementwise::{apply_scalar, dispatch_scalar_dtype, prepare_output, ScalarArith, ScalarOp};
use crate::error::Result;
use crate::operator::{binding, binding_mut, param, Data, Operator, Para};
use crate::tensor::Tensor;

/// output = input + v on a CUDA device.
#[derive(Debug, Clone, Copy, Default)]
pub struct CudaAddOp;

/// output = input * v on a CUDA device.
#[derive(Debug, Clone, Copy, Default)]
pub struct CudaMulOp;

impl Operator for CudaAddOp {
    fn name(&self) -> &str {
        ScalarOp::Add.name()
    }

    fn run(&self, data: &mut Data, para: &Para) -> Result<()> {
        run_staged(ScalarOp::Add, data, para)
    }
}

impl Operator for CudaMulOp {
    fn name(&self) -> &str {
        ScalarOp::Mul.name()
    }

    fn run(&self, data: &mut Data, para: &Para) -> Result<()> {
        run_staged(ScalarOp::Mul, data, para)
    }
}

fn run_staged(op: ScalarOp, data: &mut Data, para: &Para) -> Result<()> {
    let v = param::<f32>(para, "v")?;
    let input = binding(data, "input")?.clone();
    op.check_dtype(input.dtype())?;

    let output = binding_mut(data, "output")?;
    prepare_output(output, &input)?;

    dispatch_scalar_dtype!(input.dtype(), op, staged_kernel(op, &input, output, v))
}

fn staged_kernel<T: ScalarArith>(op: ScalarOp, input: &Tensor, output: &Tensor, v: f32) -> Result<()> {
    let mut host = input.to_vec::<T>()?;
    let cells = Cell::from_mut(host.as_mut_slice()).as_slice_of_cells();
    apply_scalar(op, cells, cells, v);
    output.copy_from_slice(&host)
}
