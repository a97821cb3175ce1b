// CUDA device (feature "cuda").
//
// Memory primitives go straight to the driver through cudarc's synchronous
// result API. The device context is bound to the calling thread before every
// driver call, so a device can be used from any thread.

pub mod ops;

use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use cudarc::driver::{result, sys, CudaContext, DriverError};

use crate::device::{Device, DeviceId, DeviceKind, DeviceRef};
use crate::error::{Result, TensorError};
use crate::operator::OperatorRegistry;

pub use ops::{CudaAddOp, CudaMulOp};

/// A CUDA GPU addressed by its ordinal.
///
/// Memory returned by `malloc` lives on the GPU and cannot be dereferenced
/// on the host; tensors on this device are read and written through
/// `to_vec`/`copy_from_slice`.
pub struct CudaDevice {
    index: usize,
    context: Arc<CudaContext>,
    ops: OperatorRegistry,
}

impl CudaDevice {
    /// Opens GPU `index` and registers its operators.
    ///
    /// # Errors
    /// Returns `Driver` if no context can be created for the ordinal.
    pub fn new(index: usize) -> Result<Self> {
        let context = CudaContext::new(index).map_err(|e| {
            TensorError::Driver(format!(
                "failed to create CUDA context for device {}: {:?}",
                index, e
            ))
        })?;
        let mut ops = OperatorRegistry::new();
        ops.register(CudaAddOp)?;
        ops.register(CudaMulOp)?;
        Ok(CudaDevice {
            index,
            context,
            ops,
        })
    }

    /// Opens GPU `index` behind a shared device handle.
    pub fn shared(index: usize) -> Result<DeviceRef> {
        Ok(Arc::new(Self::new(index)?))
    }

    fn bind(&self) -> Result<()> {
        self.context
            .bind_to_thread()
            .map_err(|e| self.driver_error("bind context", e))
    }

    fn driver_error(&self, what: &str, e: DriverError) -> TensorError {
        TensorError::Driver(format!("{} on {}: {:?}", what, self.id(), e))
    }
}

fn device_ptr(ptr: NonNull<u8>) -> sys::CUdeviceptr {
    ptr.as_ptr() as usize as sys::CUdeviceptr
}

impl fmt::Debug for CudaDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CudaDevice")
            .field("index", &self.index)
            .field("ops", &self.ops)
            .finish()
    }
}

// SAFETY: `malloc` returns a driver allocation valid until `cuMemFree`, and
// the device reports itself as not host accessible.
unsafe impl Device for CudaDevice {
    fn id(&self) -> DeviceId {
        DeviceId::new(DeviceKind::Cuda, self.index)
    }

    fn is_host_accessible(&self) -> bool {
        false
    }

    fn malloc(&self, size_bytes: usize) -> Result<NonNull<u8>> {
        self.bind()?;
        // SAFETY: the context is bound to this thread.
        let ptr = unsafe { result::malloc_sync(size_bytes) }.map_err(|e| {
            if e.0 == sys::CUresult::CUDA_ERROR_OUT_OF_MEMORY {
                TensorError::OutOfMemory {
                    device: self.id().to_string(),
                    size: size_bytes,
                }
            } else {
                self.driver_error("cuMemAlloc", e)
            }
        })?;
        NonNull::new(ptr as usize as *mut u8).ok_or_else(|| TensorError::OutOfMemory {
            device: self.id().to_string(),
            size: size_bytes,
        })
    }

    unsafe fn free(&self, ptr: NonNull<u8>, _size_bytes: usize) {
        if let Err(e) = self.bind() {
            eprintln!("[myt::cuda] free failed for ptr {:p}: {}", ptr, e);
            return;
        }
        if let Err(e) = result::free_sync(device_ptr(ptr)) {
            eprintln!("[myt::cuda] cuMemFree failed for ptr {:p}: {:?}", ptr, e);
        }
    }

    unsafe fn memcpy(&self, dst: NonNull<u8>, src: NonNull<u8>, size_bytes: usize) -> Result<()> {
        self.bind()?;
        result::memcpy_dtod_sync(device_ptr(dst), device_ptr(src), size_bytes)
            .map_err(|e| self.driver_error("cuMemcpyDtoD", e))
    }

    unsafe fn upload(&self, dst: NonNull<u8>, src: &[u8]) -> Result<()> {
        self.bind()?;
        result::memcpy_htod_sync(device_ptr(dst), src)
            .map_err(|e| self.driver_error("cuMemcpyHtoD", e))
    }

    unsafe fn download(&self, src: NonNull<u8>, dst: &mut [u8]) -> Result<()> {
        self.bind()?;
        result::memcpy_dtoh_sync(dst, device_ptr(src))
            .map_err(|e| self.driver_error("cuMemcpyDtoH", e))
    }

    fn operators(&self) -> &OperatorRegistry {
        &self.ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CpuDevice;
    use crate::dtype::DType;
    use crate::operator::{Data, Para};
    use crate::param::Param;
    use crate::shape::Shape;
    use crate::tensor::Tensor;

    #[test]
    #[ignore = "requires a CUDA device"]
    fn test_roundtrip_through_device() {
        let d = CudaDevice::shared(0).unwrap();
        let t = Tensor::from_slice(&d, Shape::new(vec![2, 2]), &[1.0f32, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(t.at(1).unwrap().to_vec::<f32>().unwrap(), vec![3.0, 4.0]);
        let copy = t.deep_clone().unwrap();
        assert_eq!(copy.to_vec::<f32>().unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    #[ignore = "requires a CUDA device"]
    fn test_host_access_rejected() {
        let d = CudaDevice::shared(0).unwrap();
        let t = Tensor::new(&d, Shape::new(vec![4]), DType::S32).unwrap();
        assert!(t.get_ptr::<i32>().is_ok());
        assert!(matches!(
            t.make_accessor::<i32, 1>(),
            Err(TensorError::NotHostAccessible(_))
        ));
    }

    #[test]
    #[ignore = "requires a CUDA device"]
    fn test_add_and_cross_device() {
        let d = CudaDevice::shared(0).unwrap();
        let input = Tensor::from_slice(&d, Shape::new(vec![3]), &[1i32, 2, 3]).unwrap();
        let mut data = Data::new();
        data.insert("input".to_string(), input);
        data.insert("output".to_string(), Tensor::empty());
        let mut para = Para::new();
        para.insert("v".to_string(), Param::F32(5.0));

        d.run("Add", &mut data, &para).unwrap();
        assert_eq!(data["output"].to_vec::<i32>().unwrap(), vec![6, 7, 8]);

        let cpu = CpuDevice::shared();
        assert!(matches!(
            cpu.run("Add", &mut data, &para),
            Err(TensorError::DeviceMismatch { .. })
        ));
    }
}
