//! wgpu compute device.
//!
//! Vector values are stored as f32 on the GPU; the `Device` interface stays
//! f64. Index arrays are u32, matching `LocalInt`.

use std::cell::Cell;

use wgpu::util::DeviceExt;

use crate::error::{MgError, Result};
use crate::LocalInt;

use super::gpu_shaders;
use super::{Device, DeviceBuffer, DeviceCounters, TransferGrid};

const WORKGROUP_SIZE: u32 = 64;
const WORKGROUP_EDGE_3D: u32 = 4;
const MAX_WORKGROUPS_PER_DIMENSION: u32 = 65_535;

/// Split a 1D workgroup count over x and y when it exceeds the per-dimension limit.
fn dispatch_2d(workgroups: u32) -> (u32, u32) {
    if workgroups <= MAX_WORKGROUPS_PER_DIMENSION {
        (workgroups, 1)
    } else {
        let dispatch_y = workgroups.div_ceil(MAX_WORKGROUPS_PER_DIMENSION);
        let dispatch_x = workgroups.div_ceil(dispatch_y);
        (dispatch_x, dispatch_y)
    }
}

/// A GPU buffer wrapping a `wgpu::Buffer` with element count metadata.
pub struct WgpuBuffer {
    pub(crate) buffer: wgpu::Buffer,
    pub(crate) n: usize,
}

impl DeviceBuffer for WgpuBuffer {
    fn len(&self) -> usize {
        self.n
    }
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct FillParams {
    value: u32,
    n: u32,
    stride: u32,
    _pad: u32,
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct F2cParams {
    nxc: u32,
    nyc: u32,
    nzc: u32,
    _pad0: u32,
    nxf: u32,
    nyf: u32,
    nzf: u32,
    _pad1: u32,
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct ProlongParams {
    n: u32,
    stride: u32,
    _pad0: u32,
    _pad1: u32,
}

struct TransferPipelines {
    fill: wgpu::ComputePipeline,
    f2c_operator: wgpu::ComputePipeline,
    prolongation: wgpu::ComputePipeline,
}

/// wgpu implementation of `Device`.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipes: TransferPipelines,
    allocations: Cell<u32>,
    bytes_allocated: Cell<u64>,
    launches: Cell<u32>,
    readbacks: Cell<u32>,
}

impl WgpuDevice {
    pub fn new() -> Result<Self> {
        pollster::block_on(Self::new_async())
    }

    async fn new_async() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| MgError::Resource("no GPU adapter found".into()))?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("hpcg_mg_gpu"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                ..Default::default()
            })
            .await
            .map_err(|e| MgError::Resource(format!("failed to get GPU device: {e}")))?;

        let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("hpcg_mg_transfer_shaders"),
            source: wgpu::ShaderSource::Wgsl(gpu_shaders::SHADER_SOURCE.into()),
        });

        let make_pipeline = |entry_point: &str| -> wgpu::ComputePipeline {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(entry_point),
                layout: None,
                module: &shader_module,
                entry_point: Some(entry_point),
                compilation_options: Default::default(),
                cache: None,
            })
        };

        let pipes = TransferPipelines {
            fill: make_pipeline("fill_u32"),
            f2c_operator: make_pipeline("f2c_operator"),
            prolongation: make_pipeline("prolongation"),
        };

        Ok(Self {
            device,
            queue,
            pipes,
            allocations: Cell::new(0),
            bytes_allocated: Cell::new(0),
            launches: Cell::new(0),
            readbacks: Cell::new(0),
        })
    }

    /// Byte size of a buffer holding `n` 4-byte elements. wgpu rejects empty
    /// storage bindings, so the size never drops below one element.
    fn byte_size(&self, n: usize) -> Result<u64> {
        let size = (n.max(1) * std::mem::size_of::<u32>()) as u64;
        let limits = self.device.limits();
        let max = limits
            .max_buffer_size
            .min(limits.max_storage_buffer_binding_size as u64);
        if size > max {
            return Err(MgError::Resource(format!(
                "GPU allocation of {size} bytes exceeds the device limit of {max}"
            )));
        }
        Ok(size)
    }

    fn create_storage(&self, label: &str, n: usize) -> Result<WgpuBuffer> {
        let size = self.byte_size(n)?;
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.allocations.set(self.allocations.get() + 1);
        self.bytes_allocated.set(self.bytes_allocated.get() + size);
        Ok(WgpuBuffer { buffer, n })
    }

    fn create_storage_init(&self, label: &str, contents: &[u8], n: usize) -> Result<WgpuBuffer> {
        if n == 0 {
            return self.create_storage(label, 0);
        }
        let size = self.byte_size(n)?;
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST,
            });
        self.allocations.set(self.allocations.get() + 1);
        self.bytes_allocated.set(self.bytes_allocated.get() + size);
        Ok(WgpuBuffer { buffer, n })
    }

    fn uniform<T: bytemuck::Pod>(&self, params: &T) -> wgpu::Buffer {
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: None,
                contents: bytemuck::bytes_of(params),
                usage: wgpu::BufferUsages::UNIFORM,
            })
    }

    fn dispatch(
        &self,
        pipeline: &wgpu::ComputePipeline,
        buffers: &[&wgpu::Buffer],
        workgroups: (u32, u32, u32),
    ) {
        let entries: Vec<wgpu::BindGroupEntry> = buffers
            .iter()
            .enumerate()
            .map(|(binding, buffer)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();
        let bg = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: None,
            layout: &pipeline.get_bind_group_layout(0),
            entries: &entries,
        });
        let mut encoder = self.device.create_command_encoder(&Default::default());
        {
            let mut pass = encoder.begin_compute_pass(&Default::default());
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, Some(&bg), &[]);
            pass.dispatch_workgroups(workgroups.0, workgroups.1, workgroups.2);
        }
        self.queue.submit(Some(encoder.finish()));
        self.launches.set(self.launches.get() + 1);
    }

    fn read_buffer<T: bytemuck::Pod>(&self, src: &WgpuBuffer) -> Result<Vec<T>> {
        if src.n == 0 {
            return Ok(Vec::new());
        }
        let size = (src.n * std::mem::size_of::<T>()) as u64;
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("read_staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self.device.create_command_encoder(&Default::default());
        encoder.copy_buffer_to_buffer(&src.buffer, 0, &staging, 0, size);
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |r| {
            let _ = sender.send(r);
        });
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|e| MgError::Resource(format!("GPU poll failed: {e}")))?;
        receiver
            .recv()
            .map_err(|e| MgError::Resource(format!("GPU readback channel closed: {e}")))?
            .map_err(|e| MgError::Resource(format!("GPU buffer map failed: {e}")))?;

        let data = slice.get_mapped_range();
        let result: Vec<T> = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        staging.unmap();
        self.readbacks.set(self.readbacks.get() + 1);
        tracing::debug!(elements = src.n, "GPU readback");
        Ok(result)
    }
}

impl Device for WgpuDevice {
    type Values = WgpuBuffer;
    type Indices = WgpuBuffer;

    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn alloc_values(&self, n: usize) -> Result<WgpuBuffer> {
        self.create_storage("values", n)
    }

    fn alloc_indices(&self, n: usize) -> Result<WgpuBuffer> {
        self.create_storage("indices", n)
    }

    fn upload_values(&self, data: &[f64]) -> Result<WgpuBuffer> {
        let data_f32: Vec<f32> = data.iter().map(|&v| v as f32).collect();
        self.create_storage_init("values", bytemuck::cast_slice(&data_f32), data.len())
    }

    fn upload_indices(&self, data: &[LocalInt]) -> Result<WgpuBuffer> {
        self.create_storage_init("indices", bytemuck::cast_slice(data), data.len())
    }

    fn write_values(&self, data: &[f64], dst: &mut WgpuBuffer) -> Result<()> {
        if data.len() != dst.n {
            return Err(MgError::Resource(format!(
                "write of {} values into a buffer of {}",
                data.len(),
                dst.n
            )));
        }
        if data.is_empty() {
            return Ok(());
        }
        let data_f32: Vec<f32> = data.iter().map(|&v| v as f32).collect();
        self.queue
            .write_buffer(&dst.buffer, 0, bytemuck::cast_slice(&data_f32));
        Ok(())
    }

    fn download_values(&self, src: &WgpuBuffer) -> Result<Vec<f64>> {
        let values: Vec<f32> = self.read_buffer(src)?;
        Ok(values.into_iter().map(f64::from).collect())
    }

    fn download_indices(&self, src: &WgpuBuffer) -> Result<Vec<LocalInt>> {
        self.read_buffer(src)
    }

    fn fill_indices(&self, buf: &mut WgpuBuffer, value: LocalInt) -> Result<()> {
        if buf.n == 0 {
            return Ok(());
        }
        let n = u32::try_from(buf.n)
            .map_err(|_| MgError::Resource(format!("fill of {} elements overflows u32", buf.n)))?;
        let (x, y) = dispatch_2d(n.div_ceil(WORKGROUP_SIZE));
        let params = self.uniform(&FillParams {
            value,
            n,
            stride: x * WORKGROUP_SIZE,
            _pad: 0,
        });
        self.dispatch(&self.pipes.fill, &[&buf.buffer, &params], (x, y, 1));
        tracing::debug!(n, "fill_u32 launched");
        Ok(())
    }

    fn launch_f2c_operator(
        &self,
        grid: &TransferGrid,
        f2c: &mut WgpuBuffer,
        c2f: &mut WgpuBuffer,
    ) -> Result<()> {
        if !grid.is_consistent() || grid.coarse_rows() == 0 {
            return Err(MgError::Resource(format!(
                "f2c_operator launch rejected: invalid transfer grid {grid:?}"
            )));
        }
        if f2c.n != grid.coarse_rows() || c2f.n != grid.fine_points() {
            return Err(MgError::Resource(format!(
                "f2c_operator launch rejected: buffers of {}/{} for {} coarse rows and {} fine points",
                f2c.n,
                c2f.n,
                grid.coarse_rows(),
                grid.fine_points()
            )));
        }
        let [nxc, nyc, nzc] = grid.coarse;
        let [nxf, nyf, nzf] = grid.fine;
        let workgroups = (
            nxc.div_ceil(WORKGROUP_EDGE_3D),
            nyc.div_ceil(WORKGROUP_EDGE_3D),
            nzc.div_ceil(WORKGROUP_EDGE_3D),
        );
        if workgroups.0.max(workgroups.1).max(workgroups.2) > MAX_WORKGROUPS_PER_DIMENSION {
            return Err(MgError::Resource(format!(
                "f2c_operator launch rejected: grid {workgroups:?} exceeds dispatch limits"
            )));
        }
        let params = self.uniform(&F2cParams {
            nxc,
            nyc,
            nzc,
            _pad0: 0,
            nxf,
            nyf,
            nzf,
            _pad1: 0,
        });
        self.dispatch(
            &self.pipes.f2c_operator,
            &[&f2c.buffer, &c2f.buffer, &params],
            workgroups,
        );
        tracing::debug!(?workgroups, "f2c_operator launched");
        Ok(())
    }

    unsafe fn launch_prolongation(
        &self,
        n_coarse: usize,
        f2c: &WgpuBuffer,
        coarse: &WgpuBuffer,
        fine: &mut WgpuBuffer,
        perm_fine: &WgpuBuffer,
        perm_coarse: &WgpuBuffer,
    ) -> Result<()> {
        if f2c.n < n_coarse || perm_coarse.n < n_coarse {
            return Err(MgError::Resource(format!(
                "prolongation launch rejected: {n_coarse} coarse rows but f2c has {} and the coarse permutation {}",
                f2c.n, perm_coarse.n
            )));
        }
        if n_coarse == 0 {
            return Ok(());
        }
        let n = u32::try_from(n_coarse).map_err(|_| {
            MgError::Resource(format!("prolongation of {n_coarse} rows overflows u32"))
        })?;
        let (x, y) = dispatch_2d(n.div_ceil(WORKGROUP_SIZE));
        let params = self.uniform(&ProlongParams {
            n,
            stride: x * WORKGROUP_SIZE,
            _pad0: 0,
            _pad1: 0,
        });
        self.dispatch(
            &self.pipes.prolongation,
            &[
                &f2c.buffer,
                &coarse.buffer,
                &fine.buffer,
                &perm_fine.buffer,
                &perm_coarse.buffer,
                &params,
            ],
            (x, y, 1),
        );
        tracing::debug!(n, "prolongation launched");
        Ok(())
    }

    fn synchronize(&self) -> Result<()> {
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map(|_| ())
            .map_err(|e| MgError::Resource(format!("GPU synchronize failed: {e}")))
    }

    fn counters(&self) -> DeviceCounters {
        DeviceCounters {
            allocations: self.allocations.get(),
            bytes_allocated: self.bytes_allocated.get(),
            launches: self.launches.get(),
            readbacks: self.readbacks.get(),
        }
    }
}
