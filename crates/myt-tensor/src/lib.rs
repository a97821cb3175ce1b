//! `myt-tensor` - Minimal tensor runtime with pluggable devices.
//!
//! This crate provides:
//! - A `Tensor` handle over reference-counted device memory, with sub-views,
//!   typed accessors and row-major traversal
//! - A `Device` trait owning raw memory primitives and a registry of named
//!   operators, dispatched with `Device::run`
//! - A reference `CpuDevice` implementation, and `CudaDevice` behind the
//!   `cuda` feature
//! - Shape utilities and data type definitions

pub mod accessor;
pub mod cpu;
#[cfg(feature = "cuda")]
pub mod cuda;
pub mod device;
pub mod dtype;
pub mod error;
pub mod operator;
pub mod param;
pub mod shape;
pub mod storage;
pub mod tensor;

// Re-export primary types at the crate root for convenience.
pub use accessor::{Accessor, AccessorView};
pub use cpu::CpuDevice;
#[cfg(feature = "cuda")]
pub use cuda::CudaDevice;
pub use device::{Device, DeviceId, DeviceKind, DeviceRef};
pub use dtype::{DType, Element};
pub use error::{Result, TensorError};
pub use operator::{Data, Operator, OperatorRegistry, Para};
pub use param::Param;
pub use shape::Shape;
pub use storage::Block;
pub use tensor::Tensor;
