// Elementwise scalar kernels shared by every device's operators.
//
// Host devices run them directly on tensor cells; devices without host
// access stage their data through host vectors and run the same code.

use std::cell::Cell;

use half::f16;

use crate::dtype::{DType, Element};
use crate::error::{Result, TensorError};
use crate::tensor::Tensor;

/// The scalar operation applied to every element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarOp {
    Add,
    Mul,
}

impl ScalarOp {
    /// Operator name under which devices register this operation.
    pub fn name(&self) -> &'static str {
        match self {
            ScalarOp::Add => "Add",
            ScalarOp::Mul => "Mul",
        }
    }

    /// Returns true if the kernels handle `dtype`.
    pub fn supports(&self, dtype: DType) -> bool {
        matches!(
            dtype,
            DType::S32 | DType::S64 | DType::F16 | DType::F32 | DType::F64
        )
    }

    /// Fails with `UnsupportedDType` unless `dtype` is handled.
    pub fn check_dtype(&self, dtype: DType) -> Result<()> {
        if !self.supports(dtype) {
            return Err(TensorError::UnsupportedDType {
                dtype,
                op: self.name().to_string(),
            });
        }
        Ok(())
    }

    fn apply<T: ScalarArith>(self, x: T, v: f32) -> T {
        match self {
            ScalarOp::Add => x.add_scalar(v),
            ScalarOp::Mul => x.mul_scalar(v),
        }
    }
}

/// Element types the scalar kernels can compute on.
///
/// The scalar operand is always `f32`. Integer types compute in their own
/// domain when `v` is a whole number, saturating at the type's bounds;
/// a fractional `v` goes through `f64` and the result is truncated.
pub trait ScalarArith: Element {
    fn add_scalar(self, v: f32) -> Self;
    fn mul_scalar(self, v: f32) -> Self;
}

/// `v` as an integer when it has no fractional part.
///
/// Whole numbers beyond `i128` saturate, which still saturates every
/// supported integer result.
fn whole(v: f32) -> Option<i128> {
    (v.is_finite() && v.fract() == 0.0).then(|| v as i128)
}

macro_rules! impl_scalar_arith_int {
    ($($ty:ty),*) => {
        $(
            impl ScalarArith for $ty {
                fn add_scalar(self, v: f32) -> Self {
                    match whole(v) {
                        Some(w) => (self as i128)
                            .saturating_add(w)
                            .clamp(<$ty>::MIN as i128, <$ty>::MAX as i128) as $ty,
                        None => (self as f64 + v as f64) as $ty,
                    }
                }

                fn mul_scalar(self, v: f32) -> Self {
                    match whole(v) {
                        Some(w) => (self as i128)
                            .saturating_mul(w)
                            .clamp(<$ty>::MIN as i128, <$ty>::MAX as i128) as $ty,
                        None => (self as f64 * v as f64) as $ty,
                    }
                }
            }
        )*
    };
}

impl_scalar_arith_int!(i32, i64);

impl ScalarArith for f32 {
    fn add_scalar(self, v: f32) -> Self {
        self + v
    }

    fn mul_scalar(self, v: f32) -> Self {
        self * v
    }
}

impl ScalarArith for f64 {
    fn add_scalar(self, v: f32) -> Self {
        self + v as f64
    }

    fn mul_scalar(self, v: f32) -> Self {
        self * v as f64
    }
}

impl ScalarArith for f16 {
    fn add_scalar(self, v: f32) -> Self {
        f16::from_f32(self.to_f32() + v)
    }

    fn mul_scalar(self, v: f32) -> Self {
        f16::from_f32(self.to_f32() * v)
    }
}

/// output[i] = op(input[i], v) for every linear index.
///
/// `input` and `output` may be the same cells.
pub fn apply_scalar<T: ScalarArith>(op: ScalarOp, input: &[Cell<T>], output: &[Cell<T>], v: f32) {
    for (x, y) in input.iter().zip(output) {
        y.set(op.apply(x.get(), v));
    }
}

/// Makes `output` match `input`'s device, shape and dtype.
///
/// An output that already matches is kept, so results land in the caller's
/// existing storage; anything else is rebound to a fresh block.
pub fn prepare_output(output: &mut Tensor, input: &Tensor) -> Result<()> {
    let device = input.device().ok_or(TensorError::NotAllocated)?;
    let reusable = output
        .device()
        .is_some_and(|d| d.id() == device.id())
        && output.shape() == input.shape()
        && output.dtype() == input.dtype();
    if !reusable {
        let device = device.clone();
        output.create(&device, input.shape().clone(), input.dtype())?;
    }
    Ok(())
}

/// Calls `$f::<T>($args..)` with `T` matching `$dtype`, or fails with
/// `UnsupportedDType` for dtypes the scalar kernels do not handle.
macro_rules! dispatch_scalar_dtype {
    ($dtype:expr, $op:expr, $f:ident($($arg:expr),* $(,)?)) => {
        match $dtype {
            $crate::dtype::DType::S32 => $f::<i32>($($arg),*),
            $crate::dtype::DType::S64 => $f::<i64>($($arg),*),
            $crate::dtype::DType::F16 => $f::<half::f16>($($arg),*),
            $crate::dtype::DType::F32 => $f::<f32>($($arg),*),
            $crate::dtype::DType::F64 => $f::<f64>($($arg),*),
            other => Err($crate::error::TensorError::UnsupportedDType {
                dtype: other,
                op: $op.name().to_string(),
            }),
        }
    };
}

pub(crate) use dispatch_scalar_dtype;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CpuDevice;
    use crate::shape::Shape;
    use approx::assert_relative_eq;

    fn cells<T: Copy>(v: &mut [T]) -> &[Cell<T>] {
        Cell::from_mut(v).as_slice_of_cells()
    }

    #[test]
    fn test_add_i32() {
        let mut input = vec![1i32, 2, 3];
        let mut output = vec![0i32; 3];
        apply_scalar(ScalarOp::Add, cells(&mut input), cells(&mut output), 5.0);
        assert_eq!(output, vec![6, 7, 8]);
    }

    #[test]
    fn test_mul_f32() {
        let mut input = vec![1.0f32, -2.0, 0.5];
        let mut output = vec![0.0f32; 3];
        apply_scalar(ScalarOp::Mul, cells(&mut input), cells(&mut output), 2.0);
        assert_relative_eq!(output[0], 2.0);
        assert_relative_eq!(output[1], -4.0);
        assert_relative_eq!(output[2], 1.0);
    }

    #[test]
    fn test_in_place() {
        let mut data = vec![1.0f64, 2.0];
        let c = cells(&mut data);
        apply_scalar(ScalarOp::Add, c, c, 0.5);
        assert_eq!(data, vec![1.5, 2.5]);
    }

    #[test]
    fn test_integer_saturates() {
        assert_eq!(i32::MAX.add_scalar(10.0), i32::MAX);
        assert_eq!(i32::MIN.mul_scalar(2.0), i32::MIN);
        assert_eq!(7i64.add_scalar(-0.5), 6);
        assert_eq!(i64::MAX.mul_scalar(-3.0), i64::MIN);
        assert_eq!(5i32.add_scalar(f32::INFINITY), i32::MAX);
    }

    #[test]
    fn test_large_i64_is_exact() {
        let x = (1i64 << 53) + 1;
        assert_eq!(x.add_scalar(0.0), x);
        assert_eq!(x.add_scalar(2.0), x + 2);
        assert_eq!(x.mul_scalar(1.0), x);
        assert_eq!(x.mul_scalar(-2.0), -2 * x);
    }

    #[test]
    fn test_half_arith() {
        let x = f16::from_f32(1.5);
        assert_relative_eq!(x.add_scalar(1.0).to_f32(), 2.5);
        assert_relative_eq!(x.mul_scalar(2.0).to_f32(), 3.0);
    }

    #[test]
    fn test_supported_dtypes() {
        assert!(ScalarOp::Add.supports(DType::S32));
        assert!(ScalarOp::Mul.supports(DType::F16));
        assert!(!ScalarOp::Add.supports(DType::S8));
        assert!(matches!(
            ScalarOp::Mul.check_dtype(DType::U64),
            Err(TensorError::UnsupportedDType { dtype: DType::U64, .. })
        ));
    }

    #[test]
    fn test_dispatch_unsupported() {
        fn noop<T: ScalarArith>() -> Result<usize> {
            Ok(std::mem::size_of::<T>())
        }
        assert_eq!(dispatch_scalar_dtype!(DType::F64, ScalarOp::Add, noop()).unwrap(), 8);
        assert!(dispatch_scalar_dtype!(DType::U8, ScalarOp::Add, noop()).is_err());
    }

    #[test]
    fn test_prepare_output_reuses_matching() {
        let device = CpuDevice::shared();
        let input = Tensor::new(&device, Shape::new(vec![2, 3]), DType::F32).unwrap();
        let mut output = Tensor::new(&device, Shape::new(vec![2, 3]), DType::F32).unwrap();
        let alias = output.clone();
        prepare_output(&mut output, &input).unwrap();
        assert!(output.shares_storage(&alias));
    }

    #[test]
    fn test_prepare_output_rebinds_mismatch() {
        let device = CpuDevice::shared();
        let input = Tensor::new(&device, Shape::new(vec![2, 3]), DType::S32).unwrap();
        let mut output = Tensor::new(&device, Shape::new(vec![6]), DType::S32).unwrap();
        let alias = output.clone();
        prepare_output(&mut output, &input).unwrap();
        assert!(!output.shares_storage(&alias));
        assert_eq!(output.shape(), input.shape());

        let mut unbound = Tensor::empty();
        prepare_output(&mut unbound, &input).unwrap();
        assert!(unbound.is_allocated());
        assert_eq!(unbound.dtype(), DType::S32);
    }
}
