pub mod elementwise;
pub mod ops;

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;
use std::sync::Arc;

use crate::device::{Device, DeviceId, DeviceKind, DeviceRef};
use crate::error::{Result, TensorError};
use crate::operator::OperatorRegistry;

pub use ops::{AddOp, MulOp};

/// Alignment of every host allocation, enough for any element type and for
/// SIMD loads.
const ALIGNMENT: usize = 64;

/// Host CPU device.
///
/// Memory comes from the global allocator, zero-filled and 64-byte aligned.
/// Registers the `Add` and `Mul` operators.
#[derive(Debug)]
pub struct CpuDevice {
    index: usize,
    ops: OperatorRegistry,
}

impl CpuDevice {
    /// The default host domain, `cpu:0`.
    pub fn new() -> Self {
        Self::with_index(0)
    }

    /// A host domain with the given index. Tensors on different host domains
    /// cannot be mixed in one operator call.
    pub fn with_index(index: usize) -> Self {
        let mut ops = OperatorRegistry::new();
        ops.insert(AddOp);
        ops.insert(MulOp);
        CpuDevice { index, ops }
    }

    /// `cpu:0` behind a shared device handle.
    pub fn shared() -> DeviceRef {
        Arc::new(Self::new())
    }

    fn layout(&self, size_bytes: usize) -> Result<Layout> {
        Layout::from_size_align(size_bytes, ALIGNMENT).map_err(|_| TensorError::OutOfMemory {
            device: self.id().to_string(),
            size: size_bytes,
        })
    }
}

impl Default for CpuDevice {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: memory comes from the global allocator with 64-byte alignment and
// is host memory for its whole lifetime.
unsafe impl Device for CpuDevice {
    fn id(&self) -> DeviceId {
        DeviceId::new(DeviceKind::Cpu, self.index)
    }

    fn is_host_accessible(&self) -> bool {
        true
    }

    fn malloc(&self, size_bytes: usize) -> Result<NonNull<u8>> {
        if size_bytes == 0 {
            return Err(TensorError::Other(format!(
                "{}: zero-sized allocation",
                self.id()
            )));
        }
        let layout = self.layout(size_bytes)?;
        // SAFETY: layout has a non-zero size.
        let ptr = unsafe { alloc_zeroed(layout) };
        NonNull::new(ptr).ok_or_else(|| TensorError::OutOfMemory {
            device: self.id().to_string(),
            size: size_bytes,
        })
    }

    unsafe fn free(&self, ptr: NonNull<u8>, size_bytes: usize) {
        // malloc only hands out pointers for layouts that were valid.
        if let Ok(layout) = self.layout(size_bytes) {
            dealloc(ptr.as_ptr(), layout);
        }
    }

    unsafe fn memcpy(&self, dst: NonNull<u8>, src: NonNull<u8>, size_bytes: usize) -> Result<()> {
        // Views of one block may overlap.
        std::ptr::copy(src.as_ptr(), dst.as_ptr(), size_bytes);
        Ok(())
    }

    unsafe fn upload(&self, dst: NonNull<u8>, src: &[u8]) -> Result<()> {
        std::ptr::copy(src.as_ptr(), dst.as_ptr(), src.len());
        Ok(())
    }

    unsafe fn download(&self, src: NonNull<u8>, dst: &mut [u8]) -> Result<()> {
        std::ptr::copy(src.as_ptr(), dst.as_mut_ptr(), dst.len());
        Ok(())
    }

    fn operators(&self) -> &OperatorRegistry {
        &self.ops
    }
}
