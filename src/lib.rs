//! Bitonic sort on compute devices.
//!
//! A float sequence is padded to a power of two, uploaded once, and sorted by
//! the `k(k+1)/2` data-parallel compare-exchange passes of a bitonic network,
//! ping-ponging between two device buffers. Sorting runs in batch mode (all
//! passes back to back, one final readback) or step-observed mode (a
//! snapshot is read back after every pass and handed to a [`StepObserver`]).
//!
//! The kernel runs on any [`ComputeDevice`]:
//! - [`HostDevice`]: rayon lanes on the CPU, always available
//! - `WgpuDevice`: portable GPU backend (feature `webgpu`)
//! - [`MetalDevice`]: Apple Metal, macOS only

pub mod buffers;
pub mod cpu_sort;
pub mod device;
pub mod engine;
pub mod error;
pub mod executor;
pub mod host_device;
pub mod kernel;
pub mod metal_device;
pub mod observer;
pub mod padding;
pub mod render;
pub mod schedule;
#[cfg(feature = "webgpu")]
pub mod wgpu_device;

pub use device::{BackendKind, ComputeDevice, DeviceInfo};
pub use engine::{EngineConfig, SortEngine};
pub use error::{DeviceError, FailureContext, SortError, SortResult};
pub use host_device::HostDevice;
pub use metal_device::MetalDevice;
pub use observer::{FixedDelay, NoDelay, Pacer, RenderingObserver, Snapshot, StepObserver};
pub use padding::FillPolicy;
pub use schedule::PassDescriptor;
#[cfg(feature = "webgpu")]
pub use wgpu_device::{WgpuDevice, WgpuDeviceConfig};
