//! Metal compute device.
//!
//! Runs the MSL compare-exchange kernel through Apple's Metal framework.
//! Buffers use shared storage, so upload and readback are plain memory
//! copies once the command buffer that last wrote them has completed.
//!
//! This module only compiles on macOS. On other platforms, a stub is
//! provided whose constructor returns `DeviceUnavailable`.

#[cfg(target_os = "macos")]
mod metal_impl {
    use std::mem;

    use log::info;
    use metal::*;

    use crate::device::{check_buffer_len, BackendKind, ComputeDevice, DeviceInfo};
    use crate::error::{DeviceError, SortError, SortResult};
    use crate::kernel::{self, WORKGROUP_SIZE};
    use crate::schedule::PassDescriptor;

    /// Must match `PassParams` in compare_exchange.metal.
    #[repr(C)]
    #[derive(Debug, Clone, Copy)]
    struct PassParams {
        stage: u32,
        step: u32,
        dispatch_width: u32,
        lane_count: u32,
    }

    /// Metal implementation of [`ComputeDevice`].
    pub struct MetalDevice {
        device: Device,
        command_queue: CommandQueue,
        pipeline: ComputePipelineState,
        /// Threads per threadgroup, capped by the pipeline's limit.
        threadgroup_size: u64,
        info: DeviceInfo,
    }

    impl std::fmt::Debug for MetalDevice {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("MetalDevice")
                .field("info", &self.info)
                .field("threadgroup_size", &self.threadgroup_size)
                .finish_non_exhaustive()
        }
    }

    impl MetalDevice {
        /// Create a device on the system default GPU.
        ///
        /// Returns an error if Metal is not available or the kernel fails to compile.
        pub fn new() -> SortResult<Self> {
            Self::create().map_err(SortError::DeviceUnavailable)
        }

        fn create() -> Result<Self, DeviceError> {
            let device = Device::system_default().ok_or_else(|| {
                DeviceError::unavailable("No Metal device found. Metal is only available on macOS and iOS.")
            })?;

            let command_queue = device.new_command_queue();

            let options = CompileOptions::new();
            let library = device
                .new_library_with_source(kernel::MSL_SOURCE, &options)
                .map_err(|e| DeviceError::unavailable(format!("Failed to compile shader: {e}")))?;

            let function = library
                .get_function(kernel::ENTRY_POINT, None)
                .map_err(|e| {
                    DeviceError::unavailable(format!("Failed to get {}: {e}", kernel::ENTRY_POINT))
                })?;

            let pipeline = device
                .new_compute_pipeline_state_with_function(&function)
                .map_err(|e| DeviceError::unavailable(format!("Failed to create pipeline: {e}")))?;

            let threadgroup_size =
                (WORKGROUP_SIZE as u64).min(pipeline.max_total_threads_per_threadgroup());

            let info = DeviceInfo {
                name: device.name().to_string(),
                backend: BackendKind::Metal,
                is_gpu: true,
                max_buffer_len: (device.max_buffer_length() / mem::size_of::<f32>() as u64)
                    as usize,
            };
            info!("acquired Metal device {}", info.name);

            Ok(Self {
                device,
                command_queue,
                pipeline,
                threadgroup_size,
                info,
            })
        }
    }

    impl ComputeDevice for MetalDevice {
        type Buffer = Buffer;

        fn info(&self) -> &DeviceInfo {
            &self.info
        }

        fn create_buffer(&self, len: usize) -> Result<Buffer, DeviceError> {
            check_buffer_len(&self.info, len)?;
            Ok(self.device.new_buffer(
                (len * mem::size_of::<f32>()) as u64,
                MTLResourceOptions::StorageModeShared,
            ))
        }

        fn upload(&self, buffer: &Buffer, values: &[f32]) -> Result<(), DeviceError> {
            let bytes = (values.len() * mem::size_of::<f32>()) as u64;
            if bytes > buffer.length() {
                return Err(DeviceError::allocation(format!(
                    "{bytes} bytes do not fit a buffer of {}",
                    buffer.length()
                )));
            }
            // SAFETY: shared-storage buffer of at least `bytes` bytes, and no
            // command buffer is in flight between jobs.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    values.as_ptr(),
                    buffer.contents() as *mut f32,
                    values.len(),
                );
            }
            Ok(())
        }

        async fn dispatch_compare_exchange(
            &self,
            input: &Buffer,
            output: &Buffer,
            pass: PassDescriptor,
            lanes: usize,
        ) -> Result<(), DeviceError> {
            let params = PassParams {
                stage: pass.stage,
                step: pass.step,
                dispatch_width: lanes as u32,
                lane_count: lanes as u32,
            };

            let command_buffer = self.command_queue.new_command_buffer();
            let encoder = command_buffer.new_compute_command_encoder();

            encoder.set_compute_pipeline_state(&self.pipeline);
            encoder.set_buffer(0, Some(input), 0);
            encoder.set_buffer(1, Some(output), 0);
            encoder.set_bytes(
                2,
                mem::size_of::<PassParams>() as u64,
                &params as *const PassParams as *const _,
            );

            let grid_size = MTLSize::new(lanes as u64, 1, 1);
            let threadgroup_size = MTLSize::new(self.threadgroup_size, 1, 1);
            encoder.dispatch_threads(grid_size, threadgroup_size);
            encoder.end_encoding();

            command_buffer.commit();
            command_buffer.wait_until_completed();

            match command_buffer.status() {
                MTLCommandBufferStatus::Completed => Ok(()),
                status => Err(DeviceError::dispatch(format!(
                    "command buffer for {pass} ended with status {status:?}"
                ))),
            }
        }

        async fn readback(&self, buffer: &Buffer, count: usize) -> Result<Vec<f32>, DeviceError> {
            let bytes = (count * mem::size_of::<f32>()) as u64;
            if bytes > buffer.length() {
                return Err(DeviceError::readback(format!(
                    "requested {bytes} bytes from a buffer of {}",
                    buffer.length()
                )));
            }
            let mut values = vec![0.0f32; count];
            // SAFETY: the last command buffer writing `buffer` has completed
            // (dispatch waits), and the buffer holds at least `count` floats.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    buffer.contents() as *const f32,
                    values.as_mut_ptr(),
                    count,
                );
            }
            Ok(values)
        }
    }
}

// Re-export the macOS implementation
#[cfg(target_os = "macos")]
pub use metal_impl::MetalDevice;

#[cfg(not(target_os = "macos"))]
mod stub {
    use std::convert::Infallible;

    use crate::device::{ComputeDevice, DeviceInfo};
    use crate::error::{DeviceError, SortError, SortResult};
    use crate::schedule::PassDescriptor;

    /// Placeholder for platforms without Metal. Cannot be constructed.
    #[derive(Debug)]
    pub struct MetalDevice {
        never: Infallible,
    }

    impl MetalDevice {
        /// On non-macOS platforms, this always returns an error.
        pub fn new() -> SortResult<Self> {
            Err(SortError::DeviceUnavailable(DeviceError::unavailable(
                "Metal is only available on macOS",
            )))
        }
    }

    impl ComputeDevice for MetalDevice {
        type Buffer = Infallible;

        fn info(&self) -> &DeviceInfo {
            match self.never {}
        }

        fn create_buffer(&self, _len: usize) -> Result<Infallible, DeviceError> {
            match self.never {}
        }

        fn upload(&self, _buffer: &Infallible, _values: &[f32]) -> Result<(), DeviceError> {
            match self.never {}
        }

        async fn dispatch_compare_exchange(
            &self,
            _input: &Infallible,
            _output: &Infallible,
            _pass: PassDescriptor,
            _lanes: usize,
        ) -> Result<(), DeviceError> {
            match self.never {}
        }

        async fn readback(&self, _buffer: &Infallible, _count: usize) -> Result<Vec<f32>, DeviceError> {
            match self.never {}
        }
    }
}

#[cfg(not(target_os = "macos"))]
pub use stub::MetalDevice;
