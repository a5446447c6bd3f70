// gpu/device.rs — wgpu adapter selection, capability gate, device creation.
//
// Responsibilities:
//   - Enumerate adapters on the requested backends and pick the best one.
//   - Answer the capability question *before* any device exists: can this
//     adapter bind an R32Float texture for sampling in a compute shader?
//   - Create the device/queue pair with error reporting routed through
//     error scopes, so driver failures come back as `GpuError` values
//     instead of panicking inside wgpu's default uncaptured-error handler.
//   - Describe the launch grid (`WorkgroupSize`, `dispatch_size`).
//
// ADAPTER SELECTION:
// Same tiered policy on every backend:
//   1. DiscreteGpu / IntegratedGpu / VirtualGpu / Other
//   2. anything else that enumerated (including software rasterizers),
//      with the adapter name logged so it is obvious what ran.
//
// ERROR SCOPES:
// wgpu reports validation and out-of-memory failures asynchronously. We
// push an OutOfMemory scope and a Validation scope around each stage of
// the probe and pop both afterwards; on native backends the pop resolves
// immediately, so `pollster::block_on` never actually waits.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::roundtrip::Stage;

/// Invocations per workgroup in each dimension. The kernel module must
/// declare exactly this tile in `@workgroup_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkgroupSize {
    pub x: u32,
    pub y: u32,
}

impl WorkgroupSize {
    /// The probe's launch tile: 16×16 threads per block.
    pub const TILE: WorkgroupSize = WorkgroupSize { x: 16, y: 16 };

    /// Total invocations per workgroup (x * y).
    pub fn total(&self) -> u32 {
        self.x * self.y
    }

    /// As the `[x, y, z]` triple a WGSL entry point declares.
    pub fn as_array(&self) -> [u32; 3] {
        [self.x, self.y, 1]
    }

    /// Number of workgroups needed to cover a `width × height` domain.
    ///
    /// Uses ceiling division, so dimensions that are not multiples of the
    /// tile still get full coverage. The kernel guards the overhang:
    /// ```wgsl
    /// if gid.x >= params.width || gid.y >= params.height { return; }
    /// ```
    pub fn dispatch_size(&self, width: u32, height: u32) -> (u32, u32) {
        (width.div_ceil(self.x), height.div_ceil(self.y))
    }
}

impl fmt::Display for WorkgroupSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}×{} ({} invocations)", self.x, self.y, self.total())
    }
}

/// Cached adapter information for logging and debugging.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub name: String,
    pub device_type: wgpu::DeviceType,
    pub backend: wgpu::Backend,
}

impl From<wgpu::AdapterInfo> for AdapterInfo {
    fn from(raw: wgpu::AdapterInfo) -> Self {
        AdapterInfo {
            name: raw.name,
            device_type: raw.device_type,
            backend: raw.backend,
        }
    }
}

impl fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:?}, {:?})",
            self.name, self.backend, self.device_type
        )
    }
}

/// Whether an adapter can sample a single-channel float texture from a
/// compute shader.
///
/// Pure so it can be exercised without a GPU; `GpuAdapter` feeds it the
/// adapter's actual format features and downlevel flags.
pub fn supports_texture_sampling(
    format_features: wgpu::TextureFormatFeatures,
    downlevel: wgpu::DownlevelFlags,
) -> bool {
    format_features
        .allowed_usages
        .contains(wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST)
        && downlevel.contains(wgpu::DownlevelFlags::COMPUTE_SHADERS)
}

// ============================================================
// Adapter
// ============================================================

/// A selected adapter that has not been turned into a device yet.
///
/// Splitting selection from device creation lets the capability gate run
/// before anything is allocated.
pub struct GpuAdapter {
    adapter: wgpu::Adapter,
    pub info: AdapterInfo,
    instance: wgpu::Instance,
}

impl GpuAdapter {
    /// Pick the best adapter on `backends`.
    pub fn select(backends: wgpu::Backends) -> Result<Self, GpuError> {
        let flags = if cfg!(debug_assertions) {
            wgpu::InstanceFlags::VALIDATION
                | wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
        } else {
            wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
        };

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends,
            flags,
            ..Default::default()
        });

        let mut all_adapters = instance.enumerate_adapters(backends);
        if all_adapters.is_empty() {
            return Err(GpuError::NoSuitableAdapter { backends });
        }

        for a in &all_adapters {
            let info = a.get_info();
            log::info!(
                "adapter: {} ({:?}, {:?})",
                info.name, info.backend, info.device_type
            );
        }

        let preferred = all_adapters.iter().position(|a| {
            matches!(
                a.get_info().device_type,
                wgpu::DeviceType::DiscreteGpu
                    | wgpu::DeviceType::IntegratedGpu
                    | wgpu::DeviceType::VirtualGpu
                    | wgpu::DeviceType::Other
            )
        });
        // Last resort: whatever exists, even a software rasterizer.
        let adapter = all_adapters.swap_remove(preferred.unwrap_or(0));

        let info = AdapterInfo::from(adapter.get_info());
        log::info!("selected adapter: {info}");

        Ok(GpuAdapter { adapter, info, instance })
    }

    /// The capability gate.
    pub fn texture_sampling_supported(&self) -> bool {
        let features = self
            .adapter
            .get_texture_format_features(crate::gpu::texture::TEXTURE_FORMAT);
        let downlevel = self.adapter.get_downlevel_capabilities().flags;
        supports_texture_sampling(features, downlevel)
    }

    /// Create the device and queue.
    pub fn into_device(self) -> Result<GpuDevice, GpuError> {
        pollster::block_on(self.request_device())
    }

    async fn request_device(self) -> Result<GpuDevice, GpuError> {
        // Downlevel defaults run on GL and mobile adapters too; the texture
        // dimension limits are lifted to whatever the adapter supports.
        let limits = wgpu::Limits::downlevel_defaults().using_resolution(self.adapter.limits());

        let (device, queue): (wgpu::Device, wgpu::Queue) = self
            .adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("tex2d-probe"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits.clone(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await
            .map_err(GpuError::DeviceRequest)?;

        // Anything that escapes an error scope is logged rather than
        // panicking inside wgpu.
        device.on_uncaptured_error(Box::new(|err: wgpu::Error| {
            log::error!("uncaptured wgpu error: {err}");
        }));

        Ok(GpuDevice {
            device,
            queue,
            adapter_info: self.info,
            workgroup_size: WorkgroupSize::TILE,
            limits,
            _instance: self.instance,
        })
    }
}

// ============================================================
// Device
// ============================================================

/// The GPU context: device, queue and the limits it was created with.
///
/// # Field drop order
/// `_instance` is declared last so the `wgpu::Instance` outlives `device`
/// and `queue`; some Vulkan layers crash when the instance is destroyed
/// while device-level objects still reference it.
pub struct GpuDevice {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: AdapterInfo,
    pub workgroup_size: WorkgroupSize,
    pub limits: wgpu::Limits,
    _instance: wgpu::Instance,
}

impl GpuDevice {
    /// Select an adapter on the primary backends and create a device on it,
    /// without running the capability gate.
    pub fn new() -> Result<Self, GpuError> {
        GpuAdapter::select(wgpu::Backends::PRIMARY)?.into_device()
    }

    /// Grid dimensions for a `width × height` launch with the active tile.
    pub fn dispatch_size(&self, width: u32, height: u32) -> (u32, u32) {
        self.workgroup_size.dispatch_size(width, height)
    }

    /// Reject dimensions the device cannot hold as a texture and an output
    /// storage buffer.
    pub fn check_dimensions(&self, width: u32, height: u32) -> Result<(), GpuError> {
        check_dimensions(&self.limits, width, height)
    }

    /// Run `f` inside Validation and OutOfMemory error scopes and turn any
    /// captured error into `GpuError::Driver` tagged with `stage`.
    pub fn scoped<T>(
        &self,
        stage: Stage,
        f: impl FnOnce(&wgpu::Device, &wgpu::Queue) -> T,
    ) -> Result<T, GpuError> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(&self.device, &self.queue);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let oom = pollster::block_on(self.device.pop_error_scope());
        match validation.or(oom) {
            Some(err) => Err(GpuError::Driver { stage, message: err.to_string() }),
            None => Ok(value),
        }
    }

    /// Block until the given submission has finished on the device.
    pub fn wait_for(&self, submission: wgpu::SubmissionIndex) {
        self.device.poll(wgpu::Maintain::WaitForSubmissionIndex(submission));
    }

    /// Copy `size` bytes of `src` into a mappable buffer and read them back.
    ///
    /// Synchronous: submits the copy, waits for it, maps, and returns an
    /// owned copy of the bytes. `src` needs `BufferUsages::COPY_SRC`.
    pub fn read_buffer(
        &self,
        stage: Stage,
        src: &wgpu::Buffer,
        size: u64,
    ) -> Result<Vec<u8>, GpuError> {
        let staging = self.scoped(stage, |device, queue| {
            let staging = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("tex2d-probe::readback"),
                size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("tex2d-probe::readback"),
            });
            encoder.copy_buffer_to_buffer(src, 0, &staging, 0, size);
            queue.submit(std::iter::once(encoder.finish()));
            staging
        })?;
        self.map_read(&staging)
    }

    /// Map a `MAP_READ` buffer, copy its contents out and unmap it.
    pub fn map_read(&self, buffer: &wgpu::Buffer) -> Result<Vec<u8>, GpuError> {
        let slice = buffer.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            // The receiver only disappears if this function already returned.
            let _ = sender.send(result);
        });

        self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|_| GpuError::MapCallbackDropped)?
            .map_err(GpuError::BufferMap)?;

        let bytes = slice.get_mapped_range().to_vec();
        buffer.unmap();
        Ok(bytes)
    }
}

impl fmt::Display for GpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GpuDevice {{ adapter: {}, workgroup: {} }}",
            self.adapter_info, self.workgroup_size
        )
    }
}

/// Dimension checks against a set of device limits.
pub(crate) fn check_dimensions(
    limits: &wgpu::Limits,
    width: u32,
    height: u32,
) -> Result<(), GpuError> {
    let max = limits.max_texture_dimension_2d;
    if width == 0 || height == 0 || width > max || height > max {
        return Err(GpuError::InvalidDimensions { width, height, max });
    }
    let bytes = u64::from(width) * u64::from(height) * 4;
    let max_bytes = u64::from(limits.max_storage_buffer_binding_size);
    if bytes > max_bytes {
        return Err(GpuError::OutputTooLarge { bytes, max: max_bytes });
    }
    Ok(())
}

// ============================================================
// Error type
// ============================================================

/// Fatal errors from the device, the kernel module or the probe's setup.
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("no adapter found on backends {backends:?}")]
    NoSuitableAdapter { backends: wgpu::Backends },

    #[error("device request failed: {0}")]
    DeviceRequest(#[source] wgpu::RequestDeviceError),

    #[error("failed to load kernel module {}: {source}", path.display())]
    ModuleLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse kernel module {}:\n{message}", path.display())]
    ModuleParse { path: PathBuf, message: String },

    #[error("kernel module does not export `{name}` (expected {expected})")]
    ModuleExport { name: String, expected: String },

    #[error("kernel tile {found:?} does not match launch tile {expected:?}")]
    TileMismatch { expected: [u32; 3], found: [u32; 3] },

    #[error("driver error during {stage}: {message}")]
    Driver { stage: Stage, message: String },

    #[error("buffer map failed: {0}")]
    BufferMap(#[source] wgpu::BufferAsyncError),

    #[error("buffer map callback was dropped before it fired")]
    MapCallbackDropped,

    #[error("dimensions {width}×{height} outside 1..={max}")]
    InvalidDimensions { width: u32, height: u32, max: u32 },

    #[error("output buffer of {bytes} bytes exceeds the {max} byte storage binding limit")]
    OutputTooLarge { bytes: u64, max: u64 },

    #[error("unsupported sampler configuration: {0}")]
    UnsupportedSampler(String),
}

// ============================================================
// Tests
// ============================================================
