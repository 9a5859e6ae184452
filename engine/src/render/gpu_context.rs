//! GPU Context
//!
//! Headless device and queue for running the culling kernels without a
//! window, plus the buffer helpers the dispatchers share: storage uploads
//! and blocking readback through a staging buffer.

use wgpu::util::DeviceExt;

use super::error::{CullError, Result};

/// Shared GPU resources
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: wgpu::AdapterInfo,
}

/// Configuration for GPU context creation
#[derive(Clone, Debug)]
pub struct GpuContextConfig {
    /// Prefer high-performance GPU
    pub high_performance: bool,
    /// Allow a software adapter when no hardware one exists
    pub allow_fallback_adapter: bool,
}

impl Default for GpuContextConfig {
    fn default() -> Self {
        Self {
            high_performance: true,
            allow_fallback_adapter: false,
        }
    }
}

impl GpuContext {
    /// Create a compute-only context.
    pub fn new_headless(config: &GpuContextConfig) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: if config.high_performance {
                wgpu::PowerPreference::HighPerformance
            } else {
                wgpu::PowerPreference::LowPower
            },
            compatible_surface: None,
            force_fallback_adapter: config.allow_fallback_adapter,
        }))
        .map_err(|_| CullError::NoAdapter)?;

        let adapter_info = adapter.get_info();
        log::info!(
            "using adapter {} ({:?}, {:?})",
            adapter_info.name,
            adapter_info.device_type,
            adapter_info.backend
        );

        let downlevel = adapter.get_downlevel_capabilities();
        if !downlevel
            .flags
            .contains(wgpu::DownlevelFlags::CUBE_ARRAY_TEXTURES)
        {
            log::warn!("adapter lacks cube array textures; stage 1 pipelines will fail to bind");
        }

        // Full-resolution tile buffers exceed the default binding size.
        let adapter_limits = adapter.limits();
        let required_limits = wgpu::Limits {
            max_storage_buffer_binding_size: adapter_limits.max_storage_buffer_binding_size,
            max_buffer_size: adapter_limits.max_buffer_size,
            ..wgpu::Limits::default()
        };

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("vpl_cull_device"),
            required_features: wgpu::Features::empty(),
            required_limits,
            memory_hints: wgpu::MemoryHints::Performance,
            ..Default::default()
        }))?;

        Ok(Self {
            device,
            queue,
            adapter_info,
        })
    }

    /// Create a uniform buffer with initial data
    pub fn create_uniform_buffer<T: bytemuck::Pod>(&self, label: &str, data: &T) -> wgpu::Buffer {
        create_uniform_buffer(&self.device, label, data)
    }

    /// Create a storage buffer from raw bytes (see [`create_storage_buffer`]).
    pub fn create_storage_buffer(
        &self,
        label: &str,
        contents: &[u8],
        extra_usage: wgpu::BufferUsages,
    ) -> wgpu::Buffer {
        create_storage_buffer(&self.device, label, contents, extra_usage)
    }

    /// Record, submit and wait for one encoder.
    pub fn submit(&self, encoder: wgpu::CommandEncoder) -> Result<()> {
        self.queue.submit(std::iter::once(encoder.finish()));
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| CullError::BufferMap(e.to_string()))?;
        Ok(())
    }

    /// Copy `count` elements of `src` to a staging buffer and read them back.
    ///
    /// `src` must have `COPY_SRC` usage.
    pub fn read_buffer<T: bytemuck::Pod>(&self, src: &wgpu::Buffer, count: usize) -> Result<Vec<T>> {
        let size = (count * std::mem::size_of::<T>()) as u64;
        if size == 0 {
            return Ok(Vec::new());
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
                label: Some("readback_encoder"),
            });
        encoder.copy_buffer_to_buffer(src, 0, &staging, 0, size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| CullError::BufferMap(e.to_string()))?;
        receiver
            .recv()
            .map_err(|e| CullError::BufferMap(e.to_string()))?
            .map_err(|e| CullError::BufferMap(e.to_string()))?;

        let data = buffer_slice.get_mapped_range();
        let result: Vec<T> = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        staging.unmap();

        Ok(result)
    }
}

/// Create a uniform buffer with initial data
pub fn create_uniform_buffer<T: bytemuck::Pod>(
    device: &wgpu::Device,
    label: &str,
    data: &T,
) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::bytes_of(data),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    })
}

/// Create a storage buffer from raw bytes.
///
/// Empty inputs get one zeroed word: zero-sized bindings are invalid.
pub fn create_storage_buffer(
    device: &wgpu::Device,
    label: &str,
    contents: &[u8],
    extra_usage: wgpu::BufferUsages,
) -> wgpu::Buffer {
    const EMPTY: [u8; 4] = [0; 4];
    let contents = if contents.is_empty() { &EMPTY[..] } else { contents };
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | extra_usage,
    })
}
