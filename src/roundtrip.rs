// roundtrip.rs — Staged texture round trip: upload, bind, launch, sync,
// compare, release.
//
// Each stage is its own type and consumes the previous one, so the kernel
// cannot be launched on an unbound texture and nothing can be read back
// before the launch has been waited on:
//
//   Initialized ──bind──▶ Bound ──launch──▶ Launched ──synchronize──▶ Synchronized
//                                                                        │
//                                                               compare ─┘──▶ Verification
//
// GPU resources live in `Resources`, whose `Drop` releases them. Every
// exit path (success, mismatch, a `?` on a driver error) therefore frees
// the texture and both buffers.

use std::fmt;

use log::{debug, warn};
use wgpu::util::DeviceExt;

use crate::config::ProbeConfig;
use crate::gpu::device::{GpuAdapter, GpuDevice, GpuError};
use crate::gpu::kernel::{KernelModule, KernelParams};
use crate::gpu::texture::{floats_from_bytes, GpuTexture, SamplerConfig};
use crate::image::{linear_ramp, Image};
use crate::verify::{self, Verification};

/// Lifecycle of one probe run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    NotStarted,
    Initialized,
    TextureBound,
    Launched,
    Synchronized,
    Compared,
    Released,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

fn enter(from: Stage, to: Stage) {
    debug!("stage {from} -> {to}");
}

/// How a run ended. Fatal errors are reported as `Err(GpuError)` instead.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Passed(Verification),
    Failed(Verification),
    /// The adapter cannot sample textures from compute shaders.
    Skipped,
}

impl Outcome {
    /// The final result line printed for a `width × height` run.
    pub fn summary(&self, width: u32, height: u32) -> String {
        match self {
            Outcome::Passed(v) => format!(
                "PASSED {width}×{height} texture round trip, {} texels compared",
                v.compared
            ),
            Outcome::Failed(v) => format!(
                "FAILED {width}×{height} texture round trip, {} mismatching rows",
                v.mismatches.len()
            ),
            Outcome::Skipped => "Texture is not supported on the device. Skipped.".to_string(),
        }
    }

    fn from_verification(v: Verification) -> Self {
        if v.passed() {
            Outcome::Passed(v)
        } else {
            Outcome::Failed(v)
        }
    }
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

struct Resources<'g> {
    gpu: &'g GpuDevice,
    texture: GpuTexture,
    output: wgpu::Buffer,
    params: wgpu::Buffer,
    output_bytes: u64,
}

impl Drop for Resources<'_> {
    fn drop(&mut self) {
        self.output.destroy();
        self.params.destroy();
        self.texture.release();
        debug!(
            "released {}×{} texture, output and params buffers on {}",
            self.texture.width, self.texture.height, self.gpu.adapter_info.name
        );
    }
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// Source uploaded, output and params buffers allocated.
pub struct Initialized<'g> {
    res: Resources<'g>,
    source: Image<f32>,
}

/// Texture, sampler and buffers bound to the kernel.
pub struct Bound<'g> {
    // Declared before `res`: the binding is dropped ahead of the resources.
    bind_group: wgpu::BindGroup,
    kernel: &'g KernelModule,
    res: Resources<'g>,
    source: Image<f32>,
}

/// Kernel submitted, not yet waited on.
pub struct Launched<'g> {
    bind_group: wgpu::BindGroup,
    submission: wgpu::SubmissionIndex,
    res: Resources<'g>,
    source: Image<f32>,
}

/// Kernel finished; the output buffer may be read.
pub struct Synchronized<'g> {
    bind_group: wgpu::BindGroup,
    res: Resources<'g>,
    source: Image<f32>,
}

impl<'g> Initialized<'g> {
    /// Upload `source` into a new texture and allocate the kernel's output
    /// and parameter buffers.
    pub fn new(gpu: &'g GpuDevice, source: Image<f32>) -> Result<Self, GpuError> {
        let width = source.width() as u32;
        let height = source.height() as u32;
        gpu.check_dimensions(width, height)?;

        let texture = GpuTexture::upload(gpu, &source, Stage::Initialized)?;
        let output_bytes = (source.width() * source.height() * std::mem::size_of::<f32>()) as u64;
        let (output, params) = gpu.scoped(Stage::Initialized, |device, _| {
            let output = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("tex2d-probe::output"),
                size: output_bytes,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("tex2d-probe::params"),
                contents: bytemuck::bytes_of(&KernelParams::new(width, height)),
                usage: wgpu::BufferUsages::UNIFORM,
            });
            (output, params)
        })?;

        enter(Stage::NotStarted, Stage::Initialized);
        Ok(Initialized {
            res: Resources { gpu, texture, output, params, output_bytes },
            source,
        })
    }

    /// Bind the texture through `sampler` and the buffers to `kernel`.
    pub fn bind(self, kernel: &'g KernelModule, sampler: SamplerConfig) -> Result<Bound<'g>, GpuError> {
        let gpu = self.res.gpu;
        let sampler = sampler.create(gpu, Stage::TextureBound)?;
        let bind_group = kernel.bind_group(
            gpu,
            Stage::TextureBound,
            &self.res.texture.view,
            &sampler,
            &self.res.output,
            &self.res.params,
        )?;

        enter(Stage::Initialized, Stage::TextureBound);
        Ok(Bound { bind_group, kernel, res: self.res, source: self.source })
    }
}

impl<'g> Bound<'g> {
    /// Submit one dispatch covering every texel.
    pub fn launch(self) -> Result<Launched<'g>, GpuError> {
        let gpu = self.res.gpu;
        let grid = gpu.dispatch_size(self.res.texture.width, self.res.texture.height);
        debug!(
            "launching {} over {}×{} workgroups of {}",
            self.kernel.interface.entry_point, grid.0, grid.1, self.kernel.tile
        );

        let submission = gpu.scoped(Stage::Launched, |device, queue| {
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("tex2d-probe::launch"),
            });
            self.kernel.encode(&mut encoder, &self.bind_group, grid);
            queue.submit(std::iter::once(encoder.finish()))
        })?;

        enter(Stage::TextureBound, Stage::Launched);
        Ok(Launched {
            bind_group: self.bind_group,
            submission,
            res: self.res,
            source: self.source,
        })
    }
}

impl<'g> Launched<'g> {
    /// Block until the launch has completed on the device.
    pub fn synchronize(self) -> Synchronized<'g> {
        self.res.gpu.wait_for(self.submission);
        enter(Stage::Launched, Stage::Synchronized);
        Synchronized { bind_group: self.bind_group, res: self.res, source: self.source }
    }
}

impl<'g> Synchronized<'g> {
    /// The kernel's output buffer, `width * height` f32s in row-major order.
    pub fn output_buffer(&self) -> &wgpu::Buffer {
        &self.res.output
    }

    /// Copy the output buffer back to the host.
    pub fn read_back(&self) -> Result<Image<f32>, GpuError> {
        let bytes = self.res.gpu.read_buffer(Stage::Compared, &self.res.output, self.res.output_bytes)?;
        Ok(Image::from_vec(
            self.source.width(),
            self.source.height(),
            floats_from_bytes(&bytes),
        ))
    }

    /// Read the output back, compare it against the source and release
    /// everything.
    pub fn compare(self) -> Result<Verification, GpuError> {
        let output = self.read_back()?;
        let verification = verify::compare(&self.source, &output);
        enter(Stage::Synchronized, Stage::Compared);

        let Synchronized { bind_group, res, source: _ } = self;
        drop(bind_group);
        debug!("texture binding released");
        drop(res);
        enter(Stage::Compared, Stage::Released);

        Ok(verification)
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Run the full round trip on an already created device and kernel.
pub fn run_round_trip(
    gpu: &GpuDevice,
    kernel: &KernelModule,
    width: u32,
    height: u32,
    sampler: SamplerConfig,
) -> Result<Verification, GpuError> {
    // Before the host buffer exists: an absurd size must not reach the allocator.
    gpu.check_dimensions(width, height)?;
    let source = linear_ramp(width as usize, height as usize);
    Initialized::new(gpu, source)?
        .bind(kernel, sampler)?
        .launch()?
        .synchronize()
        .compare()
}

/// Select an adapter, apply the capability gate and run the probe.
pub fn run(config: &ProbeConfig) -> Result<Outcome, GpuError> {
    if config.force_no_texture_support {
        warn!("texture support forced off by environment; skipping");
        enter(Stage::NotStarted, Stage::Done);
        return Ok(Outcome::Skipped);
    }

    let adapter = GpuAdapter::select(config.backend.backends())?;
    if !adapter.texture_sampling_supported() {
        warn!("{} cannot sample R32Float textures from compute shaders; skipping", adapter.info);
        enter(Stage::NotStarted, Stage::Done);
        return Ok(Outcome::Skipped);
    }

    let gpu = adapter.into_device()?;
    let kernel = KernelModule::load(&gpu, &config.kernel)?;
    let verification = run_round_trip(
        &gpu,
        &kernel,
        config.width,
        config.height,
        SamplerConfig::default(),
    )?;
    if let Some(first) = verification.first() {
        warn!(
            "{} mismatching rows, first at row {} col {}",
            verification.mismatches.len(),
            first.row,
            first.col
        );
    }
    enter(Stage::Released, Stage::Done);
    Ok(Outcome::from_verification(verification))
}
