//! Compute device abstraction.
//!
//! A [`ComputeDevice`] provides the device half of buffer management
//! (allocation, upload, readback) and runs the compare-exchange kernel.
//! Buffer roles are tracked outside the device by
//! [`BufferPair`](crate::buffers::BufferPair).
//!
//! Backends:
//! - [`HostDevice`](crate::host_device::HostDevice): CPU lanes via rayon, always available
//! - `WgpuDevice`: Vulkan/Metal/DX12 through wgpu (feature `webgpu`)
//! - [`MetalDevice`](crate::metal_device::MetalDevice): Apple Metal, macOS only

use std::fmt;
use std::future::Future;

use crate::error::DeviceError;
use crate::schedule::PassDescriptor;

/// Which backend a device belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Host,
    WebGpu,
    Metal,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Host => write!(f, "host"),
            BackendKind::WebGpu => write!(f, "webgpu"),
            BackendKind::Metal => write!(f, "metal"),
        }
    }
}

/// Information about an acquired compute device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Human-readable device name.
    pub name: String,
    pub backend: BackendKind,
    /// Whether the lanes run on a GPU rather than the host CPU.
    pub is_gpu: bool,
    /// Largest buffer, in elements, a single binding can hold.
    pub max_buffer_len: usize,
}

/// A device that can hold `f32` buffers and run compare-exchange passes.
///
/// Dispatch and readback are the only suspending operations. Everything
/// else completes synchronously.
pub trait ComputeDevice {
    /// Device-resident storage for `len` elements.
    type Buffer;

    fn info(&self) -> &DeviceInfo;

    /// Allocate an uninitialized buffer of `len` elements.
    fn create_buffer(&self, len: usize) -> Result<Self::Buffer, DeviceError>;

    /// Copy `values` into the start of `buffer`.
    fn upload(&self, buffer: &Self::Buffer, values: &[f32]) -> Result<(), DeviceError>;

    /// Run one compare-exchange pass over `lanes` lanes, reading `input` and
    /// writing `output`. Resolves once the device has finished the pass.
    fn dispatch_compare_exchange(
        &self,
        input: &Self::Buffer,
        output: &Self::Buffer,
        pass: PassDescriptor,
        lanes: usize,
    ) -> impl Future<Output = Result<(), DeviceError>>;

    /// Copy the first `count` elements of `buffer` back to the host.
    fn readback(
        &self,
        buffer: &Self::Buffer,
        count: usize,
    ) -> impl Future<Output = Result<Vec<f32>, DeviceError>>;
}

/// Reject buffers larger than the device can bind.
pub(crate) fn check_buffer_len(info: &DeviceInfo, len: usize) -> Result<(), DeviceError> {
    if len == 0 {
        return Err(DeviceError::allocation("zero-length buffer"));
    }
    if len > info.max_buffer_len {
        return Err(DeviceError::allocation(format!(
            "{len} elements exceed the {} element binding limit of {}",
            info.max_buffer_len, info.name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(max_buffer_len: usize) -> DeviceInfo {
        DeviceInfo {
            name: "test".to_string(),
            backend: BackendKind::Host,
            is_gpu: false,
            max_buffer_len,
        }
    }

    #[test]
    fn test_check_buffer_len() {
        assert!(check_buffer_len(&info(16), 16).is_ok());
        assert!(matches!(
            check_buffer_len(&info(16), 32),
            Err(DeviceError::Allocation(_))
        ));
        assert!(matches!(
            check_buffer_len(&info(16), 0),
            Err(DeviceError::Allocation(_))
        ));
    }

    #[test]
    fn test_backend_display() {
        assert_eq!(BackendKind::WebGpu.to_string(), "webgpu");
        assert_eq!(BackendKind::Host.to_string(), "host");
    }
}
