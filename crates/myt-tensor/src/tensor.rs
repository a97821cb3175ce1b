use std::cell::Cell;
use std::ptr::NonNull;

use bytemuck::Zeroable;

use crate::accessor::Accessor;
use crate::device::DeviceRef;
use crate::dtype::{DType, Element};
use crate::error::{Result, TensorError};
use crate::shape::Shape;
use crate::storage::Block;

/// A shaped, typed view over a block of device memory.
///
/// Cloning a tensor shares its block: no bytes are copied, and writes through
/// one handle are visible through every other handle on the same block.
/// [`Tensor::create`] detaches a handle by binding it to a fresh block.
///
/// Data is contiguous and row-major. Sub-views produced by [`Tensor::at`]
/// keep sharing the block and only advance the element offset.
#[derive(Debug, Clone, Default)]
pub struct Tensor {
    block: Option<Block>,
    shape: Shape,
    dtype: DType,
    offset: usize,
}

impl Tensor {
    /// An unbound tensor: no storage, rank-0 shape, zero elements.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Allocate a new tensor on `device`.
    pub fn new(device: &DeviceRef, shape: Shape, dtype: DType) -> Result<Self> {
        let mut t = Tensor::empty();
        t.create(device, shape, dtype)?;
        Ok(t)
    }

    /// Allocate a tensor on `device` and fill it from host data.
    ///
    /// The dtype is taken from the element type.
    pub fn from_slice<T: Element>(device: &DeviceRef, shape: Shape, data: &[T]) -> Result<Self> {
        if shape.checked_numel() != Some(data.len()) {
            return Err(TensorError::ShapeMismatch {
                expected: shape.dims().to_vec(),
                got: vec![data.len()],
            });
        }
        let t = Tensor::new(device, shape, T::DTYPE)?;
        t.copy_from_slice(data)?;
        Ok(t)
    }

    /// Allocate `shape.numel() * dtype.size_in_bytes()` bytes on `device` and
    /// rebind this tensor to them.
    ///
    /// The previously held block, if any, loses one reference. On error the
    /// tensor is left untouched.
    ///
    /// # Errors
    /// `InvalidShape` if any extent is zero, `SizeOverflow` if the byte size
    /// does not fit in `usize`, or the device's allocation error.
    pub fn create(&mut self, device: &DeviceRef, shape: Shape, dtype: DType) -> Result<()> {
        if shape.has_zero_extent() {
            return Err(TensorError::InvalidShape(shape.dims().to_vec()));
        }
        let size_bytes = shape
            .checked_numel()
            .and_then(|n| n.checked_mul(dtype.size_in_bytes()))
            .ok_or_else(|| TensorError::SizeOverflow {
                dims: shape.dims().to_vec(),
                elem_size: dtype.size_in_bytes(),
            })?;
        let block = Block::new(device, size_bytes)?;

        self.block = Some(block);
        self.shape = shape;
        self.dtype = dtype;
        self.offset = 0;
        Ok(())
    }

    /// The device holding this tensor's memory, or `None` if unbound.
    pub fn device(&self) -> Option<&DeviceRef> {
        self.block.as_ref().map(Block::device)
    }

    /// Returns a reference to the tensor's shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Returns the tensor's data type.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Offset of the first element, in elements from the block's base.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn is_allocated(&self) -> bool {
        self.block.is_some()
    }

    /// Number of elements in this view. Zero when unbound.
    pub fn numel(&self) -> usize {
        if self.block.is_some() {
            self.shape.numel()
        } else {
            0
        }
    }

    /// Number of bytes covered by this view.
    pub fn size_in_bytes(&self) -> usize {
        self.numel() * self.dtype.size_in_bytes()
    }

    /// Returns true if both tensors are views over the same block.
    pub fn shares_storage(&self, other: &Tensor) -> bool {
        match (&self.block, &other.block) {
            (Some(a), Some(b)) => a.same_allocation(b),
            _ => false,
        }
    }

    /// Number of handles sharing this tensor's block, 0 when unbound.
    pub fn ref_count(&self) -> usize {
        self.block.as_ref().map_or(0, Block::ref_count)
    }

    /// Sub-view with the leading dimension fixed to `index`.
    ///
    /// # Errors
    /// `NotAllocated` for an unbound tensor, `IndexOutOfBounds` if `index` is
    /// not below the leading extent or the tensor is rank 0.
    pub fn at(&self, index: usize) -> Result<Tensor> {
        let block = self.block()?;
        if self.shape.ndim() == 0 {
            return Err(TensorError::IndexOutOfBounds { index, size: 0 });
        }
        let size = self.shape.dim(0);
        if index >= size {
            return Err(TensorError::IndexOutOfBounds { index, size });
        }
        let stride = self.shape.numel() / size;
        Ok(Tensor {
            block: Some(block.clone()),
            shape: self.shape.drop_leading(1)?,
            dtype: self.dtype,
            offset: self.offset + index * stride,
        })
    }

    /// Applies [`Tensor::at`] once per index.
    pub fn at_many(&self, indices: &[usize]) -> Result<Tensor> {
        indices.iter().try_fold(self.clone(), |t, &i| t.at(i))
    }

    /// Typed pointer to the first element of this view.
    ///
    /// On devices that are not host accessible this is a device address and
    /// must only be handed to that device's kernels.
    pub fn get_ptr<T: Element>(&self) -> Result<*mut T> {
        self.check_dtype::<T>()?;
        Ok(self.data_ptr()?.as_ptr().cast::<T>())
    }

    /// The elements of this view as shared-mutable cells.
    ///
    /// Only available for host-accessible devices.
    pub fn cells<T: Element>(&self) -> Result<&[Cell<T>]> {
        self.check_host()?;
        self.check_dtype::<T>()?;
        let ptr = self.data_ptr()?.as_ptr().cast::<Cell<T>>();
        if ptr.align_offset(std::mem::align_of::<T>()) != 0 {
            return Err(TensorError::Misaligned {
                device: self.block()?.device().id().to_string(),
                align: std::mem::align_of::<T>(),
            });
        }
        // SAFETY: the view lies inside the block, which is host memory kept
        // alive by `self`, and `ptr` is aligned for `T`. `Cell<T>` has the
        // layout of `T`, and the block is not shared across threads.
        Ok(unsafe { std::slice::from_raw_parts(ptr, self.numel()) })
    }

    /// Typed accessor for nested element indexing. `R` must equal the rank.
    pub fn make_accessor<T: Element, const R: usize>(&self) -> Result<Accessor<'_, T, R>> {
        Accessor::new(self)
    }

    /// Visits every element in row-major order until `f` returns false.
    ///
    /// Returns the number of elements visited, including the one that
    /// stopped the traversal.
    pub fn traverse<T, F>(&self, mut f: F) -> Result<usize>
    where
        T: Element,
        F: FnMut(&Cell<T>) -> bool,
    {
        let mut visited = 0;
        for cell in self.cells::<T>()? {
            visited += 1;
            if !f(cell) {
                break;
            }
        }
        Ok(visited)
    }

    /// Copies this view to a host vector.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        self.check_dtype::<T>()?;
        let block = self.block()?;
        let mut out = vec![T::zeroed(); self.numel()];
        // SAFETY: the view's byte range lies inside `block`.
        unsafe {
            block
                .device()
                .download(self.data_ptr()?, bytemuck::cast_slice_mut(&mut out))?;
        }
        Ok(out)
    }

    /// Overwrites this view with host data of exactly `numel` elements.
    pub fn copy_from_slice<T: Element>(&self, data: &[T]) -> Result<()> {
        self.check_dtype::<T>()?;
        let block = self.block()?;
        if data.len() != self.numel() {
            return Err(TensorError::ShapeMismatch {
                expected: self.shape.dims().to_vec(),
                got: vec![data.len()],
            });
        }
        // SAFETY: the view's byte range lies inside `block`.
        unsafe {
            block
                .device()
                .upload(self.data_ptr()?, bytemuck::cast_slice(data))
        }
    }

    /// Copies this view into a new block on the same device.
    pub fn deep_clone(&self) -> Result<Tensor> {
        let block = self.block()?;
        let device = block.device();
        let out = Tensor::new(device, self.shape.clone(), self.dtype)?;
        // SAFETY: both ranges cover exactly one view inside live blocks.
        unsafe {
            device.memcpy(out.data_ptr()?, self.data_ptr()?, self.size_in_bytes())?;
        }
        Ok(out)
    }

    fn block(&self) -> Result<&Block> {
        self.block.as_ref().ok_or(TensorError::NotAllocated)
    }

    fn data_ptr(&self) -> Result<NonNull<u8>> {
        let block = self.block()?;
        let byte_offset = self.offset * self.dtype.size_in_bytes();
        NonNull::new(block.ptr().as_ptr().wrapping_add(byte_offset))
            .ok_or_else(|| TensorError::Other("null element address".to_string()))
    }

    fn check_dtype<T: Element>(&self) -> Result<()> {
        if T::DTYPE != self.dtype {
            return Err(TensorError::DTypeMismatch {
                expected: self.dtype,
                got: T::DTYPE,
            });
        }
        Ok(())
    }

    fn check_host(&self) -> Result<()> {
        let block = self.block()?;
        if !block.device().is_host_accessible() {
            return Err(TensorError::NotHostAccessible(block.device().id().to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CpuDevice;

    fn iota_i32(device: &DeviceRef, dims: Vec<usize>) -> Tensor {
        let shape = Shape::new(dims);
        let data: Vec<i32> = (1..=shape.numel() as i32).collect();
        Tensor::from_slice(device, shape, &data).unwrap()
    }

    #[test]
    fn test_default_is_unbound() {
        let t = Tensor::empty();
        assert!(!t.is_allocated());
        assert!(t.device().is_none());
        assert_eq!(t.shape().ndim(), 0);
        assert_eq!(t.numel(), 0);
        assert_eq!(t.ref_count(), 0);
        assert!(matches!(t.get_ptr::<f32>(), Err(TensorError::NotAllocated)));
        assert!(matches!(t.at(0), Err(TensorError::NotAllocated)));
    }

    #[test]
    fn test_create() {
        let device = CpuDevice::shared();
        let t = Tensor::new(&device, Shape::new(vec![2, 3]), DType::S8).unwrap();
        assert!(t.is_allocated());
        assert_eq!(t.shape().dims(), &[2, 3]);
        assert_eq!(t.dtype(), DType::S8);
        assert_eq!(t.offset(), 0);
        assert_eq!(t.size_in_bytes(), 6);
        assert!(!t.get_ptr::<i8>().unwrap().is_null());
        assert_eq!(t.device().unwrap().id(), device.id());
    }

    #[test]
    fn test_create_zero_filled() {
        let device = CpuDevice::shared();
        let t = Tensor::new(&device, Shape::new(vec![4]), DType::F32).unwrap();
        assert_eq!(t.to_vec::<f32>().unwrap(), vec![0.0; 4]);
    }

    #[test]
    fn test_scalar_tensor_has_one_element() {
        let device = CpuDevice::shared();
        let t = Tensor::from_slice(&device, Shape::scalar(), &[7i64]).unwrap();
        assert_eq!(t.numel(), 1);
        assert_eq!(t.to_vec::<i64>().unwrap(), vec![7]);
    }

    #[test]
    fn test_zero_extent_rejected_by_create() {
        let device = CpuDevice::shared();
        assert!(matches!(
            Tensor::new(&device, Shape::from(vec![2, 0]), DType::F32),
            Err(TensorError::InvalidShape(dims)) if dims == vec![2, 0]
        ));
        assert!(Tensor::from_slice::<f32>(&device, Shape::new(vec![0]), &[]).is_err());

        let mut t = Tensor::new(&device, Shape::new(vec![3]), DType::S32).unwrap();
        assert!(t.create(&device, Shape::new(vec![0, 4]), DType::S32).is_err());
        assert_eq!(t.shape().dims(), &[3]);
    }

    #[test]
    fn test_from_slice_length_mismatch() {
        let device = CpuDevice::shared();
        let r = Tensor::from_slice(&device, Shape::new(vec![3]), &[1.0f32, 2.0]);
        assert!(matches!(r, Err(TensorError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_clone_aliases() {
        let device = CpuDevice::shared();
        let a = iota_i32(&device, vec![2, 2]);
        let b = a.clone();
        assert!(a.shares_storage(&b));
        assert_eq!(a.ref_count(), 2);

        a.cells::<i32>().unwrap()[3].set(40);
        assert_eq!(b.to_vec::<i32>().unwrap(), vec![1, 2, 3, 40]);
    }

    #[test]
    fn test_create_detaches() {
        let device = CpuDevice::shared();
        let a = iota_i32(&device, vec![2, 2]);
        let mut b = a.clone();
        b.create(&device, Shape::new(vec![2, 2]), DType::S32).unwrap();
        assert!(!a.shares_storage(&b));
        assert_eq!(a.ref_count(), 1);

        a.cells::<i32>().unwrap()[0].set(99);
        assert_eq!(b.to_vec::<i32>().unwrap(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_sub_view_shape_and_offset() {
        let device = CpuDevice::shared();
        let t = iota_i32(&device, vec![2, 3, 4]);
        for i in 0..2 {
            let v = t.at(i).unwrap();
            assert_eq!(v.shape().dims(), &[3, 4]);
            assert_eq!(v.offset(), i * 12);
            assert!(v.shares_storage(&t));
        }
        let row = t.at(1).unwrap().at(2).unwrap();
        assert_eq!(row.shape().dims(), &[4]);
        assert_eq!(row.to_vec::<i32>().unwrap(), vec![21, 22, 23, 24]);
    }

    #[test]
    fn test_sub_view_out_of_range() {
        let device = CpuDevice::shared();
        let t = iota_i32(&device, vec![2, 3, 4]);
        assert!(matches!(
            t.at(2),
            Err(TensorError::IndexOutOfBounds { index: 2, size: 2 })
        ));
        assert!(t.at(1).unwrap().at(3).is_err());
    }

    #[test]
    fn test_sub_view_to_scalar() {
        let device = CpuDevice::shared();
        let t = iota_i32(&device, vec![2, 3, 4]);
        let e = t.at_many(&[1, 0, 2]).unwrap();
        assert_eq!(e.shape().ndim(), 0);
        assert_eq!(e.numel(), 1);
        // SAFETY: e is a live rank-0 view of host memory.
        assert_eq!(unsafe { *e.get_ptr::<i32>().unwrap() }, 15);
        assert!(e.at(0).is_err());
    }

    #[test]
    fn test_sub_view_writes_are_shared() {
        let device = CpuDevice::shared();
        let t = iota_i32(&device, vec![2, 3]);
        t.at(1).unwrap().copy_from_slice(&[7, 8, 9]).unwrap();
        assert_eq!(t.to_vec::<i32>().unwrap(), vec![1, 2, 3, 7, 8, 9]);
    }

    #[test]
    fn test_dtype_mismatch() {
        let device = CpuDevice::shared();
        let t = iota_i32(&device, vec![3]);
        assert!(matches!(
            t.get_ptr::<f32>(),
            Err(TensorError::DTypeMismatch { .. })
        ));
        assert!(t.cells::<u32>().is_err());
        assert!(t.to_vec::<i64>().is_err());
    }

    #[test]
    fn test_traverse_full() {
        let device = CpuDevice::shared();
        let t = iota_i32(&device, vec![2, 3, 4]);
        let mut seen = Vec::new();
        let visited = t
            .traverse(|c: &Cell<i32>| {
                seen.push(c.get());
                true
            })
            .unwrap();
        assert_eq!(visited, 24);
        assert_eq!(seen, (1..=24).collect::<Vec<_>>());
    }

    #[test]
    fn test_traverse_stops_early() {
        let device = CpuDevice::shared();
        let t = iota_i32(&device, vec![2, 3, 4]);
        let mut seen = Vec::new();
        let visited = t
            .traverse(|c: &Cell<i32>| {
                seen.push(c.get());
                c.get() < 5
            })
            .unwrap();
        assert_eq!(visited, 5);
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_traverse_can_write() {
        let device = CpuDevice::shared();
        let t = iota_i32(&device, vec![4]);
        t.traverse(|c: &Cell<i32>| {
            c.set(c.get() * 10);
            true
        })
        .unwrap();
        assert_eq!(t.to_vec::<i32>().unwrap(), vec![10, 20, 30, 40]);
    }

    #[test]
    fn test_traverse_sub_view() {
        let device = CpuDevice::shared();
        let t = iota_i32(&device, vec![2, 3]);
        let mut sum = 0;
        let visited = t
            .at(1)
            .unwrap()
            .traverse(|c: &Cell<i32>| {
                sum += c.get();
                true
            })
            .unwrap();
        assert_eq!(visited, 3);
        assert_eq!(sum, 4 + 5 + 6);
    }

    #[test]
    fn test_deep_clone_detaches() {
        let device = CpuDevice::shared();
        let t = iota_i32(&device, vec![2, 3]);
        let row = t.at(1).unwrap().deep_clone().unwrap();
        assert!(!row.shares_storage(&t));
        assert_eq!(row.offset(), 0);
        assert_eq!(row.to_vec::<i32>().unwrap(), vec![4, 5, 6]);

        t.copy_from_slice(&[0; 6]).unwrap();
        assert_eq!(row.to_vec::<i32>().unwrap(), vec![4, 5, 6]);
    }

    #[test]
    fn test_size_overflow() {
        let device = CpuDevice::shared();
        let r = Tensor::new(&device, Shape::new(vec![usize::MAX / 2, 2]), DType::F64);
        assert!(matches!(r, Err(TensorError::SizeOverflow { .. })));
    }

    #[test]
    fn test_failed_create_leaves_tensor_untouched() {
        let device = CpuDevice::shared();
        let mut t = iota_i32(&device, vec![2]);
        let r = t.create(&device, Shape::new(vec![usize::MAX, 2]), DType::S32);
        assert!(r.is_err());
        assert_eq!(t.shape().dims(), &[2]);
        assert_eq!(t.to_vec::<i32>().unwrap(), vec![1, 2]);
    }
}
