// gpu/texture.rs — Device texture creation, 2D strided upload, sampler setup.
//
// RESPONSIBILITIES
// ─────────────────
// 1. `GpuTexture` — a single-channel 32-bit float (R32Float) 2D texture
//    holding a copy of a host `Image<f32>`.
//
// 2. `Copy2d` — the description of a pitched host→device copy: source row
//    pitch, bytes per row actually copied, and row count. The host image's
//    pitch is `stride * 4`; for a packed image that is `width * 4`.
//
// 3. `SamplerConfig` — address modes, filter and flags for the texture
//    reference. The probe uses wrap/wrap/point/no-flags so sampling returns
//    stored values unchanged.
//
//
// THE ROW-PITCH PROBLEM
// ──────────────────────
// `copy_buffer_to_texture` requires the staging buffer's `bytes_per_row`
// to be a multiple of `wgpu::COPY_BYTES_PER_ROW_ALIGNMENT` (256). A 256-wide
// float row is 1024 bytes and happens to be aligned; a 100-wide row is 400
// bytes and is not. `Copy2d::repack` moves each source row to an aligned
// destination pitch before the upload:
//
//   source  (pitch = 400):  [row0 400B][row1 400B]...
//   staging (pitch = 512):  [row0 400B | 112B pad][row1 400B | 112B pad]...

use wgpu::util::DeviceExt;

use crate::gpu::device::{GpuDevice, GpuError};
use crate::image::Image;
use crate::roundtrip::Stage;

/// Texel format of the probe's texture.
pub const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;

const BYTES_PER_TEXEL: u32 = 4;

const COPY_ALIGNMENT: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

// ---------------------------------------------------------------------------
// Copy2d
// ---------------------------------------------------------------------------

/// A pitched 2D copy from host memory into a device texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Copy2d {
    /// Distance in bytes between the starts of consecutive source rows.
    pub src_pitch: u32,
    /// Bytes copied from each row.
    pub width_in_bytes: u32,
    /// Number of rows.
    pub height: u32,
    /// Row pitch of the staging buffer, aligned for the device copy.
    pub dst_pitch: u32,
}

impl Copy2d {
    /// Describe the copy of an entire host image.
    pub fn for_image(img: &Image<f32>) -> Self {
        let width_in_bytes = img.width() as u32 * BYTES_PER_TEXEL;
        Copy2d {
            src_pitch: img.pitch_bytes() as u32,
            width_in_bytes,
            height: img.height() as u32,
            dst_pitch: align_to(width_in_bytes, COPY_ALIGNMENT),
        }
    }

    /// Size of the staging buffer in bytes.
    pub fn staging_len(&self) -> usize {
        self.dst_pitch as usize * self.height as usize
    }

    /// Re-pitch `src` from `src_pitch` to `dst_pitch`. Padding bytes in the
    /// result are zero.
    ///
    /// # Panics
    /// Panics if `src` is shorter than the rows it is supposed to contain.
    pub fn repack(&self, src: &[u8]) -> Vec<u8> {
        let row_bytes = self.width_in_bytes as usize;
        let mut staging = vec![0u8; self.staging_len()];
        for y in 0..self.height as usize {
            let s = y * self.src_pitch as usize;
            let d = y * self.dst_pitch as usize;
            staging[d..d + row_bytes].copy_from_slice(&src[s..s + row_bytes]);
        }
        staging
    }
}

// ---------------------------------------------------------------------------
// SamplerConfig
// ---------------------------------------------------------------------------

/// Sampling policy attached to the texture reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerConfig {
    /// `[u, v]` address modes.
    pub address_mode: [wgpu::AddressMode; 2],
    pub filter: wgpu::FilterMode,
    /// Extra reference flags. Only 0 (unnormalised reads disabled, no
    /// sRGB/integer promotion) is supported.
    pub flags: u32,
}

impl Default for SamplerConfig {
    /// Wrap on both axes, point filtering, no flags.
    fn default() -> Self {
        SamplerConfig {
            address_mode: [wgpu::AddressMode::Repeat; 2],
            filter: wgpu::FilterMode::Nearest,
            flags: 0,
        }
    }
}

impl SamplerConfig {
    /// Check that the policy can be applied to an R32Float texture bound as
    /// a non-filterable float texture.
    pub fn validate(&self) -> Result<(), GpuError> {
        if self.flags != 0 {
            return Err(GpuError::UnsupportedSampler(format!(
                "flags {:#x} (only 0 is supported)",
                self.flags
            )));
        }
        if self.filter != wgpu::FilterMode::Nearest {
            // R32Float is not filterable without FLOAT32_FILTERABLE.
            return Err(GpuError::UnsupportedSampler(format!(
                "{:?} filtering on {TEXTURE_FORMAT:?}",
                self.filter
            )));
        }
        Ok(())
    }

    pub fn descriptor(&self) -> wgpu::SamplerDescriptor<'static> {
        wgpu::SamplerDescriptor {
            label: Some("tex2d-probe::tex"),
            address_mode_u: self.address_mode[0],
            address_mode_v: self.address_mode[1],
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: self.filter,
            min_filter: self.filter,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        }
    }

    /// Validate and create the sampler.
    pub fn create(&self, gpu: &GpuDevice, stage: Stage) -> Result<wgpu::Sampler, GpuError> {
        self.validate()?;
        let desc = self.descriptor();
        gpu.scoped(stage, |device, _| device.create_sampler(&desc))
    }
}

// ---------------------------------------------------------------------------
// GpuTexture
// ---------------------------------------------------------------------------

/// A 2D R32Float texture resident on the GPU.
///
/// Owns its wgpu resources; `release` (or dropping it) frees the texture.
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    /// Full-texture view, bound as `texture_2d<f32>`.
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl GpuTexture {
    /// Create a texture matching `src` and copy `src` into it.
    ///
    /// The copy is submitted but not waited on; later submissions on the
    /// same queue observe it.
    pub fn upload(gpu: &GpuDevice, src: &Image<f32>, stage: Stage) -> Result<Self, GpuError> {
        let width = src.width() as u32;
        let height = src.height() as u32;
        let copy = Copy2d::for_image(src);
        let staging = copy.repack(src.as_bytes());

        log::debug!(
            "uploading {width}×{height} texture: src pitch {} B, staging pitch {} B",
            copy.src_pitch,
            copy.dst_pitch
        );

        gpu.scoped(stage, |device, queue| {
            let size = wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            };

            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some("tex2d-probe::texture"),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: TEXTURE_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_DST
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

            let staging_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("tex2d-probe::staging"),
                contents: &staging,
                usage: wgpu::BufferUsages::COPY_SRC,
            });

            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("tex2d-probe::upload"),
            });
            encoder.copy_buffer_to_texture(
                wgpu::ImageCopyBuffer {
                    buffer: &staging_buf,
                    layout: wgpu::ImageDataLayout {
                        offset: 0,
                        bytes_per_row: Some(copy.dst_pitch),
                        rows_per_image: Some(height),
                    },
                },
                wgpu::ImageCopyTexture {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                size,
            );
            queue.submit(std::iter::once(encoder.finish()));

            GpuTexture { texture, view, width, height }
        })
    }

    /// Read the texture contents back to the host, bypassing the sampler.
    ///
    /// **Expensive and synchronous.** Used to tell an upload fault apart
    /// from a sampling fault.
    pub fn readback(&self, gpu: &GpuDevice, stage: Stage) -> Result<Image<f32>, GpuError> {
        let row_bytes = self.width * BYTES_PER_TEXEL;
        let aligned = align_to(row_bytes, COPY_ALIGNMENT);

        let buffer = gpu.scoped(stage, |device, queue| {
            let buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("tex2d-probe::texture-readback"),
                size: u64::from(aligned) * u64::from(self.height),
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("tex2d-probe::texture-readback"),
            });
            encoder.copy_texture_to_buffer(
                wgpu::ImageCopyTexture {
                    texture: &self.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::ImageCopyBuffer {
                    buffer: &buffer,
                    layout: wgpu::ImageDataLayout {
                        offset: 0,
                        bytes_per_row: Some(aligned),
                        rows_per_image: Some(self.height),
                    },
                },
                wgpu::Extent3d {
                    width: self.width,
                    height: self.height,
                    depth_or_array_layers: 1,
                },
            );
            queue.submit(std::iter::once(encoder.finish()));
            buffer
        })?;

        let bytes = gpu.map_read(&buffer)?;
        buffer.destroy();

        // Strip the per-row alignment padding.
        let unpack = Copy2d {
            src_pitch: aligned,
            width_in_bytes: row_bytes,
            height: self.height,
            dst_pitch: row_bytes,
        };
        let packed = unpack.repack(&bytes);
        Ok(Image::from_vec(
            self.width as usize,
            self.height as usize,
            floats_from_bytes(&packed),
        ))
    }

    /// Free the device memory now rather than when the handle is dropped.
    pub fn release(&self) {
        self.texture.destroy();
    }
}

/// Decode native-endian f32s from a mapped byte range.
///
/// Mapped ranges and `Vec<u8>` carry no f32 alignment guarantee, so this
/// reads element by element instead of casting the slice.
pub(crate) fn floats_from_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(bytemuck::pod_read_unaligned::<f32>)
        .collect()
}

/// Round `value` up to the next multiple of `alignment`.
///
///   align_to(400, 256)  = 512
///   align_to(1024, 256) = 1024
#[inline]
pub(crate) fn align_to(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}
