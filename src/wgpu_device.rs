//! WebGPU (wgpu) compute device.
//!
//! Runs the WGSL compare-exchange kernel on whatever backend wgpu selects
//! (Vulkan, Metal, DX12, GL). One compute pipeline and one uniform buffer
//! are created per device and reused by every job; the uniform slot is
//! rewritten with `(stage, step)` before each dispatch.
//!
//! # Feature Gate
//!
//! Only available with the `webgpu` feature (enabled by default).

use std::sync::Mutex;

use futures_intrusive::channel::shared::oneshot_channel;
use log::{info, warn};

use crate::device::{check_buffer_len, BackendKind, ComputeDevice, DeviceInfo};
use crate::error::{DeviceError, SortError, SortResult};
use crate::kernel::{self, WORKGROUP_SIZE};
use crate::schedule::PassDescriptor;

/// Kernel parameters, laid out as `PassParams` in compare_exchange.wgsl.
/// 4 x u32 = 16 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
struct PassParams {
    stage: u32,
    step: u32,
    dispatch_width: u32,
    lane_count: u32,
}

/// Options for acquiring a wgpu device.
#[derive(Debug, Clone)]
pub struct WgpuDeviceConfig {
    /// Ask for a high-performance adapter instead of any adapter.
    pub prefer_gpu: bool,
    /// Label attached to the device and its resources.
    pub label: String,
}

impl Default for WgpuDeviceConfig {
    fn default() -> Self {
        Self {
            prefer_gpu: true,
            label: "bitonic-sort".to_string(),
        }
    }
}

/// Probe all available WebGPU adapters without creating a device.
pub fn probe_devices() -> Vec<DeviceInfo> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });

    instance
        .enumerate_adapters(wgpu::Backends::all())
        .into_iter()
        .map(|adapter| adapter_info(&adapter))
        .collect()
}

fn adapter_info(adapter: &wgpu::Adapter) -> DeviceInfo {
    let info = adapter.get_info();
    let limits = adapter.limits();
    DeviceInfo {
        name: format!("{} ({:?})", info.name, info.backend),
        backend: BackendKind::WebGpu,
        is_gpu: matches!(
            info.device_type,
            wgpu::DeviceType::DiscreteGpu | wgpu::DeviceType::IntegratedGpu
        ),
        max_buffer_len: max_buffer_len(&limits),
    }
}

fn max_buffer_len(limits: &wgpu::Limits) -> usize {
    let bytes = (limits.max_storage_buffer_binding_size as u64).min(limits.max_buffer_size);
    (bytes / std::mem::size_of::<f32>() as u64) as usize
}

/// wgpu implementation of [`ComputeDevice`].
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    /// The single parameter slot shared by all passes.
    params: wgpu::Buffer,
    /// Serializes parameter writes with their submission.
    submit_lock: Mutex<()>,
    max_workgroups_per_dim: u32,
    label: String,
    info: DeviceInfo,
}

impl std::fmt::Debug for WgpuDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuDevice")
            .field("info", &self.info)
            .field("max_workgroups_per_dim", &self.max_workgroups_per_dim)
            .finish_non_exhaustive()
    }
}

impl WgpuDevice {
    /// Acquire the best available adapter, blocking the calling thread.
    pub fn new() -> SortResult<Self> {
        Self::with_config(WgpuDeviceConfig::default())
    }

    pub fn with_config(config: WgpuDeviceConfig) -> SortResult<Self> {
        pollster::block_on(Self::request(config)).map_err(SortError::DeviceUnavailable)
    }

    /// Acquire an adapter and device and build the kernel pipeline.
    pub async fn request(config: WgpuDeviceConfig) -> Result<Self, DeviceError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let power_preference = if config.prefer_gpu {
            wgpu::PowerPreference::HighPerformance
        } else {
            wgpu::PowerPreference::None
        };

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .ok_or_else(|| DeviceError::unavailable("no WebGPU adapter found"))?;

        let info = adapter_info(&adapter);
        let limits = adapter.limits();
        if !info.is_gpu {
            warn!("WebGPU adapter {} is not a GPU", info.name);
        }

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some(&config.label),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits.clone(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(DeviceError::unavailable)?;

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("compare_exchange"),
            source: wgpu::ShaderSource::Wgsl(kernel::WGSL_SOURCE.into()),
        });

        let storage_entry = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("compare_exchange_layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, false),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<PassParams>() as u64,
                        ),
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("compare_exchange_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("compare_exchange"),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some(kernel::ENTRY_POINT),
            compilation_options: Default::default(),
            cache: None,
        });

        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("pass_params"),
            size: std::mem::size_of::<PassParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        info!("acquired WebGPU device {}", info.name);

        Ok(Self {
            device,
            queue,
            pipeline,
            bind_group_layout,
            params,
            submit_lock: Mutex::new(()),
            max_workgroups_per_dim: limits.max_compute_workgroups_per_dimension,
            label: config.label,
            info,
        })
    }

    /// Split `lanes` into a 2D grid of workgroups within the per-dimension limit.
    ///
    /// Returns `(x, y, dispatch_width)`; the kernel linearizes with
    /// `gid.x + gid.y * dispatch_width`.
    fn grid(&self, lanes: usize) -> (u32, u32, u32) {
        let groups = kernel::workgroup_count(lanes);
        let max = self.max_workgroups_per_dim.max(1);
        if groups <= max {
            (groups, 1, groups * WORKGROUP_SIZE)
        } else {
            (max, groups.div_ceil(max), max * WORKGROUP_SIZE)
        }
    }

    async fn wait_idle(&self) -> Result<(), DeviceError> {
        let (sender, receiver) = oneshot_channel();
        self.queue.on_submitted_work_done(move || {
            let _ = sender.send(());
        });
        self.device.poll(wgpu::Maintain::Wait);
        receiver
            .receive()
            .await
            .ok_or_else(|| DeviceError::dispatch("device lost before work completed"))
    }
}

impl ComputeDevice for WgpuDevice {
    type Buffer = wgpu::Buffer;

    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn create_buffer(&self, len: usize) -> Result<wgpu::Buffer, DeviceError> {
        check_buffer_len(&self.info, len)?;
        Ok(self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&self.label),
            size: (len * std::mem::size_of::<f32>()) as u64,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        }))
    }

    fn upload(&self, buffer: &wgpu::Buffer, values: &[f32]) -> Result<(), DeviceError> {
        let bytes: &[u8] = bytemuck::cast_slice(values);
        if bytes.len() as u64 > buffer.size() {
            return Err(DeviceError::allocation(format!(
                "{} bytes do not fit a buffer of {}",
                bytes.len(),
                buffer.size()
            )));
        }
        self.queue.write_buffer(buffer, 0, bytes);
        Ok(())
    }

    async fn dispatch_compare_exchange(
        &self,
        input: &wgpu::Buffer,
        output: &wgpu::Buffer,
        pass: PassDescriptor,
        lanes: usize,
    ) -> Result<(), DeviceError> {
        let (x, y, dispatch_width) = self.grid(lanes);
        let params = PassParams {
            stage: pass.stage,
            step: pass.step,
            dispatch_width,
            lane_count: lanes as u32,
        };

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("compare_exchange_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: input.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: output.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.params.as_entire_binding(),
                },
            ],
        });

        let guard = self
            .submit_lock
            .lock()
            .map_err(|_| DeviceError::dispatch("submit lock poisoned"))?;
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        self.queue
            .write_buffer(&self.params, 0, bytemuck::bytes_of(&params));

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("compare_exchange"),
            });
        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("compare_exchange"),
                timestamp_writes: None,
            });
            cpass.set_pipeline(&self.pipeline);
            cpass.set_bind_group(0, &bind_group, &[]);
            cpass.dispatch_workgroups(x, y, 1);
        }
        self.queue.submit(Some(encoder.finish()));
        let scope = self.device.pop_error_scope();
        drop(guard);

        if let Some(err) = scope.await {
            return Err(DeviceError::dispatch(err));
        }

        self.wait_idle().await
    }

    async fn readback(&self, buffer: &wgpu::Buffer, count: usize) -> Result<Vec<f32>, DeviceError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let size = (count * std::mem::size_of::<f32>()) as u64;
        if size > buffer.size() {
            return Err(DeviceError::readback(format!(
                "requested {size} bytes from a buffer of {}",
                buffer.size()
            )));
        }

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback_staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback"),
            });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = oneshot_channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        receiver
            .receive()
            .await
            .ok_or_else(|| DeviceError::readback("map_async callback channel dropped"))?
            .map_err(DeviceError::readback)?;

        let data = slice.get_mapped_range();
        let values = bytemuck::cast_slice::<u8, f32>(&data).to_vec();
        drop(data);
        staging.unmap();
        Ok(values)
    }
}
