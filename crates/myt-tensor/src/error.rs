use thiserror::Error;

use crate::dtype::DType;

#[derive(Error, Debug)]
pub enum TensorError {
    #[error("invalid shape {0:?}: every extent must be positive")]
    InvalidShape(Vec<usize>),
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },
    #[error("dtype mismatch: expected {expected}, got {got}")]
    DTypeMismatch { expected: DType, got: DType },
    #[error("rank mismatch: expected {expected}, got {got}")]
    RankMismatch { expected: usize, got: usize },
    #[error("index {index} out of bounds for dimension of size {size}")]
    IndexOutOfBounds { index: usize, size: usize },
    #[error("tensor is not bound to any storage")]
    NotAllocated,
    #[error("memory of device {0} is not addressable from the host")]
    NotHostAccessible(String),
    #[error("memory of device {device} is not aligned to {align} bytes")]
    Misaligned { device: String, align: usize },
    #[error("allocation size overflows for shape {dims:?} with {elem_size}-byte elements")]
    SizeOverflow { dims: Vec<usize>, elem_size: usize },
    #[error("out of memory on {device}: failed to allocate {size} bytes")]
    OutOfMemory { device: String, size: usize },
    #[error("operator '{name}' is not registered on device {device}")]
    UnknownOperator { device: String, name: String },
    #[error("operator '{0}' is already registered")]
    DuplicateOperator(String),
    #[error("operator '{name}' failed: {source}")]
    OperatorFailed {
        name: String,
        #[source]
        source: Box<TensorError>,
    },
    #[error("missing tensor binding: {0}")]
    MissingBinding(String),
    #[error("missing parameter: {0}")]
    MissingParam(String),
    #[error("type mismatch for parameter '{name}': expected {expected}, got {got}")]
    ParamTypeMismatch {
        name: String,
        expected: &'static str,
        got: &'static str,
    },
    #[error("tensor bound to '{role}' lives on {got}, but the operator runs on {expected}")]
    DeviceMismatch {
        role: String,
        expected: String,
        got: String,
    },
    #[error("unsupported dtype {dtype} for operator '{op}'")]
    UnsupportedDType { dtype: DType, op: String },
    #[error("driver error: {0}")]
    Driver(String),
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, TensorError>;
