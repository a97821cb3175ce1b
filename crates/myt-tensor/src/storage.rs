use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::device::DeviceRef;
use crate::error::Result;

/// A block of device memory shared by one or more tensors.
///
/// Cloning a `Block` shares the allocation. The memory is returned to its
/// device when the last clone is dropped.
///
/// The raw pointer keeps `Block` neither `Send` nor `Sync`, so aliased
/// tensors cannot be touched from two threads at once.
#[derive(Clone)]
pub struct Block {
    inner: Arc<BlockInner>,
}

struct BlockInner {
    ptr: NonNull<u8>,
    size_bytes: usize,
    device: DeviceRef,
}

impl Block {
    /// Allocates `size_bytes` bytes on `device`.
    ///
    /// # Errors
    /// Propagates the device's allocation failure.
    pub fn new(device: &DeviceRef, size_bytes: usize) -> Result<Self> {
        let ptr = device.malloc(size_bytes)?;
        Ok(Block {
            inner: Arc::new(BlockInner {
                ptr,
                size_bytes,
                device: Arc::clone(device),
            }),
        })
    }

    /// Base address of the allocation.
    #[inline]
    pub fn ptr(&self) -> NonNull<u8> {
        self.inner.ptr
    }

    /// Size of the allocation in bytes.
    #[inline]
    pub fn size_bytes(&self) -> usize {
        self.inner.size_bytes
    }

    /// The device that owns this allocation.
    #[inline]
    pub fn device(&self) -> &DeviceRef {
        &self.inner.device
    }

    /// Number of live handles sharing this allocation.
    #[inline]
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Returns true if both handles refer to the same allocation.
    #[inline]
    pub fn same_allocation(&self, other: &Block) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Drop for BlockInner {
    fn drop(&mut self) {
        // SAFETY: ptr/size_bytes came from malloc on this device and this is
        // the last handle.
        unsafe { self.device.free(self.ptr, self.size_bytes) }
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("ptr", &self.inner.ptr)
            .field("size_bytes", &self.inner.size_bytes)
            .field("device", &self.inner.device.id())
            .field("refs", &Arc::strong_count(&self.inner))
            .finish()
    }
}
