// gpu/kernel.rs — Loading, checking and binding the kernel module.
//
// The kernel is not embedded in the binary. It is a WGSL module read from
// disk at run time (default `kernels/tex2d_kernel.wgsl`), so a different
// build of the kernel can be probed without rebuilding the probe.
//
// Before the module reaches the device it is parsed with naga and checked
// for the exports the probe binds to:
//
//   name / slot              expected
//   ─────────────────────    ──────────────────────────────────────────
//   `tex2d_kernel`           @compute entry point, @workgroup_size(16,16,1)
//   `tex`   @binding(0)      texture_2d<f32>            (texture reference)
//   @binding(1)              sampler (non-comparison)
//   @binding(2)              var<storage, read_write>   (output)
//   @binding(3)              var<uniform>, 16 bytes     (KernelParams)
//
// A missing or mistyped export is reported as `GpuError::ModuleExport`
// naming the export, rather than surfacing later as a wgpu validation
// error about a bind group layout.

use std::num::NonZeroU64;
use std::path::{Path, PathBuf};

use crate::gpu::device::{GpuDevice, GpuError, WorkgroupSize};
use crate::roundtrip::Stage;

/// Default location of the kernel module, relative to the working directory.
pub const KERNEL_FILE: &str = "kernels/tex2d_kernel.wgsl";

/// Name of the texture reference the module must export.
pub const TEXTURE_REFERENCE: &str = "tex";

/// Name of the compute entry point.
pub const ENTRY_POINT: &str = "tex2d_kernel";

pub const BINDING_TEXTURE: u32 = 0;
pub const BINDING_SAMPLER: u32 = 1;
pub const BINDING_OUTPUT: u32 = 2;
pub const BINDING_PARAMS: u32 = 3;

// ---------------------------------------------------------------------------
// Launch parameters (must match the WGSL `Params` struct exactly)
// ---------------------------------------------------------------------------

/// Launch parameters uploaded as a uniform buffer.
///
/// Layout must match `Params` in `tex2d_kernel.wgsl`:
///   offset  0: width  (u32)
///   offset  4: height (u32)
///   offset  8: _pad0  (u32)
///   offset 12: _pad1  (u32)
///   total:  16 bytes
///
/// The output buffer is not part of the record; it is bound at
/// `BINDING_OUTPUT`.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct KernelParams {
    pub width: u32,
    pub height: u32,
    _pad: [u32; 2],
}

const _: () = assert!(std::mem::size_of::<KernelParams>() == 16);

impl KernelParams {
    pub fn new(width: u32, height: u32) -> Self {
        KernelParams { width, height, _pad: [0; 2] }
    }

    pub const SIZE: u64 = std::mem::size_of::<KernelParams>() as u64;
}

// ---------------------------------------------------------------------------
// KernelSource
// ---------------------------------------------------------------------------

/// Kernel module source text, as read from disk.
#[derive(Debug, Clone)]
pub struct KernelSource {
    path: PathBuf,
    source: String,
}

/// What the module exports, as found by `KernelSource::interface`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelInterface {
    pub entry_point: String,
    pub workgroup_size: [u32; 3],
    /// Name of the sampler global, if it has one.
    pub sampler: Option<String>,
}

impl KernelSource {
    /// Read the module at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GpuError> {
        let path = path.as_ref().to_path_buf();
        let source = std::fs::read_to_string(&path)
            .map_err(|source| GpuError::ModuleLoad { path: path.clone(), source })?;
        log::debug!("loaded kernel module {} ({} bytes)", path.display(), source.len());
        Ok(KernelSource { path, source })
    }

    /// Wrap in-memory WGSL. `path` is only used in diagnostics.
    pub fn from_wgsl(path: impl Into<PathBuf>, source: impl Into<String>) -> Self {
        KernelSource { path: path.into(), source: source.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Parse the module and check every export the probe binds to.
    pub fn interface(&self) -> Result<KernelInterface, GpuError> {
        let module = naga::front::wgsl::parse_str(&self.source).map_err(|e| {
            GpuError::ModuleParse {
                path: self.path.clone(),
                message: e.emit_to_string(&self.source),
            }
        })?;

        let entry = module
            .entry_points
            .iter()
            .find(|ep| ep.name == ENTRY_POINT && ep.stage == naga::ShaderStage::Compute)
            .ok_or_else(|| export_error(ENTRY_POINT, "a @compute entry point"))?;

        let tile = WorkgroupSize::TILE.as_array();
        if entry.workgroup_size != tile {
            return Err(GpuError::TileMismatch {
                expected: tile,
                found: entry.workgroup_size,
            });
        }

        let find_binding = |binding: u32| {
            module.global_variables.iter().map(|(_, var)| var).find(|var| {
                var.binding == Some(naga::ResourceBinding { group: 0, binding })
            })
        };

        // Texture reference: looked up by name, then checked for slot and type.
        let tex = module
            .global_variables
            .iter()
            .map(|(_, var)| var)
            .find(|var| var.name.as_deref() == Some(TEXTURE_REFERENCE))
            .ok_or_else(|| export_error(TEXTURE_REFERENCE, "a texture reference"))?;
        let tex_ok = tex.binding == Some(naga::ResourceBinding { group: 0, binding: BINDING_TEXTURE })
            && matches!(
                module.types[tex.ty].inner,
                naga::TypeInner::Image {
                    dim: naga::ImageDimension::D2,
                    arrayed: false,
                    class: naga::ImageClass::Sampled {
                        kind: naga::ScalarKind::Float,
                        multi: false,
                    },
                }
            );
        if !tex_ok {
            return Err(export_error(
                TEXTURE_REFERENCE,
                "texture_2d<f32> at @group(0) @binding(0)",
            ));
        }

        let sampler = find_binding(BINDING_SAMPLER)
            .filter(|var| {
                matches!(
                    module.types[var.ty].inner,
                    naga::TypeInner::Sampler { comparison: false }
                )
            })
            .ok_or_else(|| export_error("sampler", "sampler at @group(0) @binding(1)"))?;

        find_binding(BINDING_OUTPUT)
            .filter(|var| match var.space {
                naga::AddressSpace::Storage { access } => {
                    access.contains(naga::StorageAccess::STORE)
                }
                _ => false,
            })
            .ok_or_else(|| {
                export_error("output", "var<storage, read_write> at @group(0) @binding(2)")
            })?;

        find_binding(BINDING_PARAMS)
            .filter(|var| {
                var.space == naga::AddressSpace::Uniform
                    && matches!(
                        module.types[var.ty].inner,
                        naga::TypeInner::Struct { span, .. } if u64::from(span) == KernelParams::SIZE
                    )
            })
            .ok_or_else(|| {
                export_error("params", "16-byte var<uniform> struct at @group(0) @binding(3)")
            })?;

        Ok(KernelInterface {
            entry_point: entry.name.clone(),
            workgroup_size: entry.workgroup_size,
            sampler: sampler.name.clone(),
        })
    }
}

fn export_error(name: &str, expected: &str) -> GpuError {
    GpuError::ModuleExport {
        name: name.to_string(),
        expected: expected.to_string(),
    }
}

// ---------------------------------------------------------------------------
// KernelModule
// ---------------------------------------------------------------------------

/// A checked kernel module compiled into a compute pipeline.
///
/// Create once; each probe run makes its own bind group against it.
pub struct KernelModule {
    pipeline: wgpu::ComputePipeline,
    bgl: wgpu::BindGroupLayout,
    pub interface: KernelInterface,
    pub tile: WorkgroupSize,
}

impl KernelModule {
    /// Read, check and compile the module at `path`.
    pub fn load(gpu: &GpuDevice, path: impl AsRef<Path>) -> Result<Self, GpuError> {
        let source = KernelSource::load(path)?;
        Self::compile(gpu, &source)
    }

    /// Check and compile an already loaded module.
    pub fn compile(gpu: &GpuDevice, source: &KernelSource) -> Result<Self, GpuError> {
        let interface = source.interface()?;
        log::debug!(
            "kernel module {}: entry `{}`, tile {:?}",
            source.path().display(),
            interface.entry_point,
            interface.workgroup_size
        );

        // Compiled before any per-run resource exists.
        let (pipeline, bgl) = gpu.scoped(Stage::NotStarted, |device, _| {
            let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("tex2d_kernel.wgsl"),
                source: wgpu::ShaderSource::Wgsl(source.source().into()),
            });

            // Mirrors the @group(0) bindings checked in `interface`.
            let bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("tex2d_kernel BGL"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: BINDING_TEXTURE,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Texture {
                            multisampled: false,
                            view_dimension: wgpu::TextureViewDimension::D2,
                            sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: BINDING_SAMPLER,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: BINDING_OUTPUT,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: false },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: BINDING_PARAMS,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: NonZeroU64::new(KernelParams::SIZE),
                        },
                        count: None,
                    },
                ],
            });

            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("tex2d_kernel layout"),
                bind_group_layouts: &[&bgl],
                push_constant_ranges: &[],
            });

            let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(ENTRY_POINT),
                layout: Some(&layout),
                module: &shader,
                entry_point: ENTRY_POINT,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            });

            (pipeline, bgl)
        })?;

        Ok(KernelModule {
            pipeline,
            bgl,
            interface,
            tile: WorkgroupSize::TILE,
        })
    }

    /// Bind the texture reference, sampler, output and parameters.
    pub fn bind_group(
        &self,
        gpu: &GpuDevice,
        stage: Stage,
        texture: &wgpu::TextureView,
        sampler: &wgpu::Sampler,
        output: &wgpu::Buffer,
        params: &wgpu::Buffer,
    ) -> Result<wgpu::BindGroup, GpuError> {
        gpu.scoped(stage, |device, _| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("tex2d_kernel bind group"),
                layout: &self.bgl,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: BINDING_TEXTURE,
                        resource: wgpu::BindingResource::TextureView(texture),
                    },
                    wgpu::BindGroupEntry {
                        binding: BINDING_SAMPLER,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: BINDING_OUTPUT,
                        resource: output.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: BINDING_PARAMS,
                        resource: params.as_entire_binding(),
                    },
                ],
            })
        })
    }

    /// Record one dispatch of `grid` workgroups into `encoder`.
    pub fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        bind_group: &wgpu::BindGroup,
        grid: (u32, u32),
    ) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(ENTRY_POINT),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(grid.0, grid.1, 1);
    }
}
