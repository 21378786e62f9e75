use std::mem::size_of;
use std::sync::Arc;

use ndarray::{Array2, ArrayView2, ArrayViewMut2};
use parking_lot::ReentrantMutex;

use super::runtime::{Copy2D, Copy2DKind, DeviceId, DevicePtr, DeviceRuntime, Status};
use crate::{Error, Result, Tensor, TensorInfo};

/// Serializes "select device, then act on it" sequences across the process.
///
/// Reentrant so that a device buffer dropped while the lock is held (for
/// example when an upload fails) can still free itself on the same thread.
static CONTEXT_LOCK: ReentrantMutex<()> = parking_lot::const_reentrant_mutex(());

/// Logical shape of a 2D buffer, independent of where it lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Layout2D {
    pub height: usize,
    pub width: usize,
}

impl Layout2D {
    /// Tightly packed row size in bytes.
    pub fn row_bytes(&self) -> usize {
        self.width * size_of::<f32>()
    }

    pub fn len(&self) -> usize {
        self.height * self.width
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryInfo {
    pub free: u64,
    pub total: u64,
}

impl MemoryInfo {
    pub fn used(&self) -> u64 {
        self.total.saturating_sub(self.free)
    }
}

fn check(operation: &'static str, status: Status) -> Result<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(Error::Transfer { operation, status })
    }
}

/// A runtime bound to one accelerator.
///
/// Every call re-selects the device under a process-wide lock before running,
/// so two `Gpu`s for different devices can be used from different threads.
pub struct Gpu<R: DeviceRuntime> {
    runtime: Arc<R>,
    device: DeviceId,
}

impl<R: DeviceRuntime> Clone for Gpu<R> {
    fn clone(&self) -> Self {
        Self {
            runtime: Arc::clone(&self.runtime),
            device: self.device,
        }
    }
}

impl<R: DeviceRuntime> std::fmt::Debug for Gpu<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gpu").field("device", &self.device).finish()
    }
}

impl<R: DeviceRuntime> Gpu<R> {
    pub fn new(runtime: Arc<R>, device: DeviceId) -> Result<Self> {
        if device.0 >= runtime.device_count() {
            return Err(Error::DeviceContext {
                device,
                status: Status::InvalidDevice,
            });
        }
        Ok(Self { runtime, device })
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub fn runtime(&self) -> &Arc<R> {
        &self.runtime
    }

    fn with_context<T>(&self, f: impl FnOnce(&R) -> Result<T>) -> Result<T> {
        let _guard = CONTEXT_LOCK.lock();
        let status = self.runtime.set_current(self.device);
        if !status.is_success() {
            return Err(Error::DeviceContext {
                device: self.device,
                status,
            });
        }
        f(self.runtime.as_ref())
    }

    /// Allocates pitched device memory shaped like `source` and uploads it
    /// with a single 2D copy.
    ///
    /// If the upload fails the allocation is freed before the error is returned.
    pub fn allocate_device(&self, source: ArrayView2<'_, f32>) -> Result<DeviceMemory2D<R>> {
        let (height, width) = source.dim();
        if height == 0 || width == 0 {
            return Err(Error::Layout(format!(
                "cannot allocate an empty {}x{} device buffer",
                height, width
            )));
        }
        let layout = Layout2D { height, width };
        let source = source.as_standard_layout();
        let host = source
            .as_slice()
            .ok_or_else(|| Error::Layout("source buffer is not row-major contiguous".to_string()))?;
        let host: &[u8] = bytemuck::cast_slice(host);

        self.with_context(|runtime| {
            let (ptr, pitch) = runtime
                .malloc_pitch(layout.row_bytes(), height)
                .map_err(|status| Error::Transfer {
                    operation: "malloc_pitch",
                    status,
                })?;
            tracing::debug!(
                device = %self.device,
                ptr = ptr.0,
                height,
                width,
                pitch,
                "allocated pitched device buffer"
            );
            let memory = DeviceMemory2D {
                gpu: self.clone(),
                ptr,
                pitch,
                layout,
                released: false,
            };

            let copy = Copy2D {
                kind: Copy2DKind::HostToDevice { src: host, dst: ptr },
                src_pitch: layout.row_bytes(),
                dst_pitch: pitch,
                width_bytes: layout.row_bytes(),
                height,
            };
            tracing::trace!(
                direction = copy.direction(),
                bytes = layout.row_bytes() * height,
                src_pitch = copy.src_pitch,
                dst_pitch = copy.dst_pitch,
                "2d copy"
            );
            check("memcpy_2d (host to device)", runtime.memcpy_2d(copy))?;
            Ok(memory)
        })
    }

    /// Free and total bytes on this device.
    pub fn free_memory(&self) -> Result<MemoryInfo> {
        self.with_context(|runtime| {
            let (free, total) = runtime.mem_get_info().map_err(|status| Error::Transfer {
                operation: "mem_get_info",
                status,
            })?;
            tracing::debug!(device = %self.device, free, total, "queried device memory");
            Ok(MemoryInfo { free, total })
        })
    }

    /// Uploads a tensor as one row per sample.
    pub fn upload_tensor(&self, tensor: &Tensor) -> Result<DeviceMemory2D<R>> {
        self.allocate_device(tensor.as_rows()?)
    }

    /// Downloads rows written by [`Gpu::upload_tensor`] into a `[n, c, h, w]` tensor.
    pub fn download_tensor(&self, memory: &DeviceMemory2D<R>, info: TensorInfo) -> Result<Tensor> {
        if memory.device() != self.device {
            return Err(Error::DeviceContext {
                device: memory.device(),
                status: Status::InvalidContext,
            });
        }
        Tensor::from_rows(memory.copy_to_host()?, info)
    }
}

/// One pitched allocation on a device.
///
/// Owned by whoever allocated it. [`DeviceMemory2D::release`] frees it and
/// reports failures; dropping it frees it too and only logs them.
pub struct DeviceMemory2D<R: DeviceRuntime> {
    gpu: Gpu<R>,
    ptr: DevicePtr,
    pitch: usize,
    layout: Layout2D,
    released: bool,
}

impl<R: DeviceRuntime> std::fmt::Debug for DeviceMemory2D<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceMemory2D")
            .field("device", &self.gpu.device)
            .field("ptr", &self.ptr)
            .field("pitch", &self.pitch)
            .field("layout", &self.layout)
            .finish()
    }
}

impl<R: DeviceRuntime> DeviceMemory2D<R> {
    pub fn device(&self) -> DeviceId {
        self.gpu.device
    }

    pub fn ptr(&self) -> DevicePtr {
        self.ptr
    }

    /// Row stride in bytes, at least `layout().row_bytes()`.
    pub fn pitch(&self) -> usize {
        self.pitch
    }

    pub fn layout(&self) -> Layout2D {
        self.layout
    }

    /// Copies the buffer into `destination`, which must have the same shape
    /// and be row-major contiguous.
    pub fn copy_to(&self, mut destination: ArrayViewMut2<'_, f32>) -> Result<()> {
        let (height, width) = destination.dim();
        if (height, width) != (self.layout.height, self.layout.width) {
            return Err(Error::ShapeMismatch {
                expected: vec![self.layout.height, self.layout.width],
                actual: vec![height, width],
            });
        }
        let host = destination.as_slice_mut().ok_or_else(|| {
            Error::Layout("destination buffer is not row-major contiguous".to_string())
        })?;
        let host: &mut [u8] = bytemuck::cast_slice_mut(host);

        self.gpu.with_context(|runtime| {
            let copy = Copy2D {
                kind: Copy2DKind::DeviceToHost { src: self.ptr, dst: host },
                src_pitch: self.pitch,
                dst_pitch: self.layout.row_bytes(),
                width_bytes: self.layout.row_bytes(),
                height,
            };
            tracing::trace!(
                direction = copy.direction(),
                bytes = self.layout.row_bytes() * height,
                src_pitch = copy.src_pitch,
                dst_pitch = copy.dst_pitch,
                "2d copy"
            );
            check("memcpy_2d (device to host)", runtime.memcpy_2d(copy))
        })
    }

    /// Copies the buffer into a freshly allocated host array.
    pub fn copy_to_host(&self) -> Result<Array2<f32>> {
        let mut host = Array2::zeros((self.layout.height, self.layout.width));
        self.copy_to(host.view_mut())?;
        Ok(host)
    }

    pub fn release(mut self) -> Result<()> {
        self.free_once()
    }

    fn free_once(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        let ptr = self.ptr;
        self.gpu.with_context(|runtime| check("free", runtime.free(ptr)))?;
        tracing::debug!(device = %self.gpu.device, ptr = ptr.0, "freed device buffer");
        Ok(())
    }
}

impl<R: DeviceRuntime> Drop for DeviceMemory2D<R> {
    fn drop(&mut self) {
        if let Err(e) = self.free_once() {
            tracing::warn!(error = %e, ptr = self.ptr.0, "failed to free device buffer");
        }
    }
}
