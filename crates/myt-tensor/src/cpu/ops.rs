use crate::cpu::elementwise::{apply_scalar, dispatch_scalar_dtype, prepare_output, ScalarArith, ScalarOp};
use crate::error::Result;
use crate::operator::{binding, binding_mut, param, Data, Operator, Para};
use crate::tensor::Tensor;

/// output = input + v, elementwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddOp;

/// output = input * v, elementwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct MulOp;

impl Operator for AddOp {
    fn name(&self) -> &str {
        ScalarOp::Add.name()
    }

    fn run(&self, data: &mut Data, para: &Para) -> Result<()> {
        run_scalar(ScalarOp::Add, data, para)
    }
}

impl Operator for MulOp {
    fn name(&self) -> &str {
        ScalarOp::Mul.name()
    }

    fn run(&self, data: &mut Data, para: &Para) -> Result<()> {
        run_scalar(ScalarOp::Mul, data, para)
    }
}

/// Reads "input" and the f32 parameter "v", writes "output" in place.
fn run_scalar(op: ScalarOp, data: &mut Data, para: &Para) -> Result<()> {
    let v = param::<f32>(para, "v")?;
    let input = binding(data, "input")?.clone();
    op.check_dtype(input.dtype())?;

    let output = binding_mut(data, "output")?;
    prepare_output(output, &input)?;

    dispatch_scalar_dtype!(input.dtype(), op, host_kernel(op, &input, output, v))
}

fn host_kernel<T: ScalarArith>(op: ScalarOp, input: &Tensor, output: &Tensor, v: f32) -> Result<()> {
    apply_scalar(op, input.cells::<T>()?, output.cells::<T>()?, v);
    Ok(())
}
