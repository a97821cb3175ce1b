use std::fmt::{self, Debug};
use std::ptr::NonNull;
use std::sync::Arc;

use crate::error::{Result, TensorError};
use crate::operator::{Data, OperatorRegistry, Para};

/// The kind of compute/memory domain a device represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Cpu,
    Cuda,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Cpu => write!(f, "cpu"),
            DeviceKind::Cuda => write!(f, "cuda"),
        }
    }
}

/// Identifies a device: its kind plus the domain index within that kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId {
    pub kind: DeviceKind,
    pub index: usize,
}

impl DeviceId {
    pub fn new(kind: DeviceKind, index: usize) -> Self {
        DeviceId { kind, index }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.index)
    }
}

/// Shared handle to a device. Tensors keep one alive for as long as they
/// hold memory allocated on it.
pub type DeviceRef = Arc<dyn Device>;

/// Trait for pluggable compute devices (CPU, CUDA, etc.).
///
/// A device owns the raw memory primitives used by tensor storage and a
/// fixed registry of operators, populated when the device is constructed.
///
/// # Safety
/// Tensors build host slices directly over device memory, so implementors
/// must uphold:
/// - `malloc` returns a region of at least `size_bytes` bytes that stays
///   valid until `free` is called on it.
/// - If `is_host_accessible` returns true, that region is host memory,
///   readable and writable from the calling thread and aligned for every
///   [`Element`](crate::dtype::Element) type (8 bytes suffices).
/// - `is_host_accessible` and `id` return the same value for the device's
///   whole lifetime.
pub unsafe trait Device: Send + Sync + Debug {
    /// Returns the kind and domain index of this device.
    fn id(&self) -> DeviceId;

    /// Returns true if pointers returned by `malloc` can be dereferenced on
    /// the host.
    fn is_host_accessible(&self) -> bool;

    /// Allocates `size_bytes` bytes of device memory.
    ///
    /// # Errors
    /// Returns `OutOfMemory` when the request cannot be satisfied.
    fn malloc(&self, size_bytes: usize) -> Result<NonNull<u8>>;

    /// Releases memory obtained from `malloc`.
    ///
    /// # Safety
    /// `ptr` must come from `malloc` on this device with the same
    /// `size_bytes`, and must not be used afterwards.
    unsafe fn free(&self, ptr: NonNull<u8>, size_bytes: usize);

    /// Copies `size_bytes` bytes between two allocations of this device.
    ///
    /// # Safety
    /// Both ranges must lie inside live allocations of this device.
    unsafe fn memcpy(&self, dst: NonNull<u8>, src: NonNull<u8>, size_bytes: usize) -> Result<()>;

    /// Copies host bytes into device memory at `dst`.
    ///
    /// # Safety
    /// `dst..dst + src.len()` must lie inside a live allocation of this device.
    unsafe fn upload(&self, dst: NonNull<u8>, src: &[u8]) -> Result<()>;

    /// Copies device memory at `src` into host bytes.
    ///
    /// # Safety
    /// `src..src + dst.len()` must lie inside a live allocation of this device.
    unsafe fn download(&self, src: NonNull<u8>, dst: &mut [u8]) -> Result<()>;

    /// Returns the operators this device can execute.
    fn operators(&self) -> &OperatorRegistry;

    /// Runs the operator registered under `name`.
    ///
    /// Every allocated tensor in `data` must live on this device; unbound
    /// tensors (typically outputs) are allowed and left to the operator.
    ///
    /// # Errors
    /// - `UnknownOperator` if nothing is registered under `name`
    /// - `DeviceMismatch` if a bound tensor lives on another device
    /// - `OperatorFailed` wrapping the cause if the operator itself fails
    fn run(&self, name: &str, data: &mut Data, para: &Para) -> Result<()> {
        let op = self
            .operators()
            .get(name)
            .ok_or_else(|| TensorError::UnknownOperator {
                device: self.id().to_string(),
                name: name.to_string(),
            })?;

        let id = self.id();
        for (role, tensor) in data.iter() {
            if let Some(device) = tensor.device() {
                if device.id() != id {
                    return Err(TensorError::DeviceMismatch {
                        role: role.clone(),
                        expected: id.to_string(),
                        got: device.id().to_string(),
                    });
                }
            }
        }

        op.run(data, para).map_err(|e| TensorError::OperatorFailed {
            name: name.to_string(),
            source: Box::new(e),
        })
    }
}
