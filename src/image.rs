// image.rs — Host-side 2D buffers and the CPU reference sampler.
//
// Every buffer the probe touches on the host is an `Image<T>`:
//
//   - the source buffer that gets uploaded into the device texture,
//   - the output buffer read back after the kernel has run.
//
// The CPU reference sampler at the bottom of this file is the
// authoritative model of what the kernel must produce: it applies the
// same normalised-coordinate math as `tex2d_kernel.wgsl` and the same
// addressing rules as the device sampler. The device result is compared
// against the source directly, but the reference is what justifies that
// comparison being exact.
//
// MEMORY LAYOUT
// ─────────────
// Row-major, with an explicit stride (in elements) that may exceed the
// width. Padding elements are never read by accessors.
//
//   data index:  0  1  2  3 [4]  5  6  7  8 [9]
//   pixel:       ■  ■  ■  ■  ·   ■  ■  ■  ■  ·
//   row:         |--- row 0 ---|  |--- row 1 ---|

use std::fmt;

// ---------------------------------------------------------------------------
// Pixel Trait
// ---------------------------------------------------------------------------

/// Element types that can live in an `Image` and be shipped to the GPU
/// byte-for-byte.
///
/// `bytemuck::Pod` is what lets `Image::as_bytes` hand the raw buffer to a
/// wgpu copy without an unsafe cast.
pub trait Pixel: bytemuck::Pod + Default + PartialEq + Send + Sync + 'static {}

impl Pixel for f32 {}

// ---------------------------------------------------------------------------
// Image<T>
// ---------------------------------------------------------------------------

/// A 2D buffer with runtime dimensions, generic over element type `T`.
#[derive(Clone, PartialEq)]
pub struct Image<T: Pixel> {
    /// Elements in row-major order. Length = height * stride.
    data: Vec<T>,
    width: usize,
    height: usize,
    /// Row stride in *elements* (not bytes). stride >= width.
    stride: usize,
}

impl<T: Pixel> Image<T> {
    // --- Constructors ---

    /// Create a zero-initialised image. Stride equals width.
    pub fn new(width: usize, height: usize) -> Self {
        Self::new_with_stride(width, height, width)
    }

    /// Create a zero-initialised image with an explicit stride.
    ///
    /// # Panics
    /// Panics if `stride < width`.
    pub fn new_with_stride(width: usize, height: usize, stride: usize) -> Self {
        assert!(
            stride >= width,
            "stride ({stride}) must be >= width ({width})"
        );
        Image {
            data: vec![T::default(); height * stride],
            width,
            height,
            stride,
        }
    }

    /// Create an image from a packed element vector (stride == width).
    ///
    /// # Panics
    /// Panics if `data.len() != width * height`.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            width * height,
            "data length ({}) must equal width * height ({})",
            data.len(),
            width * height,
        );
        Image {
            data,
            width,
            height,
            stride: width,
        }
    }

    /// Create an image from raw data with explicit stride.
    ///
    /// # Panics
    /// Panics if `data.len() != height * stride` or `stride < width`.
    pub fn from_vec_with_stride(
        width: usize,
        height: usize,
        stride: usize,
        data: Vec<T>,
    ) -> Self {
        assert!(stride >= width, "stride ({stride}) must be >= width ({width})");
        assert_eq!(
            data.len(),
            height * stride,
            "data length ({}) must equal height * stride ({})",
            data.len(),
            height * stride,
        );
        Image {
            data,
            width,
            height,
            stride,
        }
    }

    // --- Accessors ---

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Value at column `x`, row `y`.
    ///
    /// # Panics
    /// Panics if (x, y) is out of bounds.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        self.bounds_check(x, y);
        self.data[y * self.stride + x]
    }

    #[inline]
    pub fn get_mut(&mut self, x: usize, y: usize) -> &mut T {
        self.bounds_check(x, y);
        let idx = y * self.stride + x;
        &mut self.data[idx]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        *self.get_mut(x, y) = value;
    }

    /// Borrow row `y` without its stride padding.
    #[inline]
    pub fn row(&self, y: usize) -> &[T] {
        assert!(y < self.height, "row {y} out of bounds (height {})", self.height);
        let start = y * self.stride;
        &self.data[start..start + self.width]
    }

    /// Iterate over all elements as `(x, y, value)`, skipping padding.
    pub fn pixels(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        (0..self.height).flat_map(move |y| {
            (0..self.width).map(move |x| (x, y, self.data[y * self.stride + x]))
        })
    }

    /// The underlying buffer as raw bytes, including stride padding.
    /// This is what a 2D strided copy reads from.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    /// Row pitch in bytes.
    pub fn pitch_bytes(&self) -> usize {
        self.stride * std::mem::size_of::<T>()
    }

    #[inline]
    fn bounds_check(&self, x: usize, y: usize) {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x},{y}) out of bounds for image {}×{}",
            self.width,
            self.height,
        );
    }
}

impl<T: Pixel + fmt::Debug> fmt::Debug for Image<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Image<{}> {{ {}×{}, stride={} }}",
            std::any::type_name::<T>(),
            self.width,
            self.height,
            self.stride,
        )?;
        for y in 0..self.height.min(8) {
            write!(f, "  row {y}: [")?;
            for x in 0..self.width.min(16) {
                if x > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{:?}", self.get(x, y))?;
            }
            if self.width > 16 {
                write!(f, ", ...")?;
            }
            writeln!(f, "]")?;
        }
        if self.height > 8 {
            writeln!(f, "  ...")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Source data
// ---------------------------------------------------------------------------

/// The probe's source buffer: every element holds its own row-major index,
/// `value(x, y) = y * width + x`.
///
/// Deterministic by construction. All indices below 2^24 are exactly
/// representable in f32, which covers every size up to 4096×4096.
pub fn linear_ramp(width: usize, height: usize) -> Image<f32> {
    let data = (0..width * height).map(|i| i as f32).collect();
    Image::from_vec(width, height, data)
}

// ---------------------------------------------------------------------------
// CPU reference sampler
// ---------------------------------------------------------------------------
//
// Mirrors nearest-neighbour (point) sampling of a 2D texture with
// normalised coordinates:
//
//   texel = floor(u * width)        then the address mode maps texel
//   into [0, width). ClampToBorder returns the border colour, which for
//   a single-channel float texture with the default transparent-black
//   border is 0.0.

/// Map a possibly out-of-range texel index into `[0, size)`, or `None`
/// when the address mode samples the border.
pub fn resolve_texel(texel: i64, size: usize, mode: wgpu::AddressMode) -> Option<usize> {
    let n = size as i64;
    let idx = match mode {
        wgpu::AddressMode::Repeat => texel.rem_euclid(n),
        wgpu::AddressMode::ClampToEdge => texel.clamp(0, n - 1),
        wgpu::AddressMode::MirrorRepeat => {
            let m = texel.rem_euclid(2 * n);
            if m >= n { 2 * n - 1 - m } else { m }
        }
        wgpu::AddressMode::ClampToBorder => {
            if texel < 0 || texel >= n {
                return None;
            }
            texel
        }
    };
    Some(idx as usize)
}

/// Point-sample `img` at normalised coordinates `(u, v)`.
///
/// `modes` is `[address_mode_u, address_mode_v]`.
///
/// # Panics
/// Panics if the image is empty.
pub fn sample_point(img: &Image<f32>, u: f32, v: f32, modes: [wgpu::AddressMode; 2]) -> f32 {
    assert!(img.width() > 0 && img.height() > 0, "cannot sample an empty image");
    let tx = (u * img.width() as f32).floor() as i64;
    let ty = (v * img.height() as f32).floor() as i64;
    match (
        resolve_texel(tx, img.width(), modes[0]),
        resolve_texel(ty, img.height(), modes[1]),
    ) {
        (Some(x), Some(y)) => img.get(x, y),
        _ => 0.0,
    }
}

/// What `tex2d_kernel` writes for every output element, computed on the CPU.
///
/// Each invocation `(x, y)` samples at the texel centre
/// `((x + 0.5) / width, (y + 0.5) / height)`, exactly like the kernel.
pub fn reference_kernel(src: &Image<f32>, modes: [wgpu::AddressMode; 2]) -> Image<f32> {
    let (w, h) = (src.width(), src.height());
    let mut out = Image::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let u = (x as f32 + 0.5) / w as f32;
            let v = (y as f32 + 0.5) / h as f32;
            out.set(x, y, sample_point(src, u, v, modes));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const WRAP: [wgpu::AddressMode; 2] = [wgpu::AddressMode::Repeat; 2];

    #[test]
    fn test_new_f32() {
        let img: Image<f32> = Image::new(10, 5);
        assert_eq!(img.width(), 10);
        assert_eq!(img.height(), 5);
        assert_eq!(img.stride(), 10);
        for (_, _, v) in img.pixels() {
            assert_eq!(v, 0.0);
        }
    }

    #[test]
    fn test_set_get() {
        let mut img: Image<f32> = Image::new(4, 3);
        img.set(0, 0, 10.0);
        img.set(3, 2, 255.5);
        assert_eq!(img.get(0, 0), 10.0);
        assert_eq!(img.get(3, 2), 255.5);
        assert_eq!(img.get(2, 2), 0.0);
    }

    #[test]
    fn test_stride_padding_bytes() {
        let img: Image<f32> = Image::new_with_stride(4, 3, 8);
        assert_eq!(img.as_bytes().len(), 24 * 4);
        assert_eq!(img.pitch_bytes(), 32);
    }

    #[test]
    fn test_row_slice_skips_padding() {
        let img = Image::from_vec_with_stride(
            3, 2, 4,
            vec![1.0f32, 2.0, 3.0, -1.0,
                 4.0, 5.0, 6.0, -1.0],
        );
        assert_eq!(img.row(0), &[1.0, 2.0, 3.0]);
        assert_eq!(img.row(1), &[4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_linear_ramp_values() {
        let img = linear_ramp(256, 256);
        assert_eq!(img.get(0, 0), 0.0);
        assert_eq!(img.get(255, 0), 255.0);
        assert_eq!(img.get(0, 1), 256.0);
        assert_eq!(img.get(255, 255), 65535.0);
    }

    #[test]
    fn test_linear_ramp_is_deterministic() {
        assert_eq!(linear_ramp(37, 11), linear_ramp(37, 11));
    }

    #[test]
    fn test_resolve_texel_repeat() {
        assert_eq!(resolve_texel(0, 4, wgpu::AddressMode::Repeat), Some(0));
        assert_eq!(resolve_texel(4, 4, wgpu::AddressMode::Repeat), Some(0));
        assert_eq!(resolve_texel(-1, 4, wgpu::AddressMode::Repeat), Some(3));
        assert_eq!(resolve_texel(9, 4, wgpu::AddressMode::Repeat), Some(1));
    }

    #[test]
    fn test_resolve_texel_mirror() {
        let m = wgpu::AddressMode::MirrorRepeat;
        assert_eq!(resolve_texel(4, 4, m), Some(3));
        assert_eq!(resolve_texel(7, 4, m), Some(0));
        assert_eq!(resolve_texel(-1, 4, m), Some(0));
    }

    #[test]
    fn test_resolve_texel_clamp_and_border() {
        assert_eq!(resolve_texel(-3, 4, wgpu::AddressMode::ClampToEdge), Some(0));
        assert_eq!(resolve_texel(10, 4, wgpu::AddressMode::ClampToEdge), Some(3));
        assert_eq!(resolve_texel(4, 4, wgpu::AddressMode::ClampToBorder), None);
        assert_eq!(resolve_texel(2, 4, wgpu::AddressMode::ClampToBorder), Some(2));
    }

    #[test]
    fn test_sample_point_wraps_past_the_edge() {
        let img = linear_ramp(4, 2);
        // u = 1.125 → texel 4 → wraps to column 0.
        assert_eq!(sample_point(&img, 1.125, 0.25, WRAP), img.get(0, 0));
        // v = -0.25 → texel -1 → wraps to the last row.
        assert_eq!(sample_point(&img, 0.375, -0.25, WRAP), img.get(1, 1));
    }

    #[test]
    fn test_sample_point_border_is_zero() {
        let img = linear_ramp(4, 4);
        let border = [wgpu::AddressMode::ClampToBorder; 2];
        assert_eq!(sample_point(&img, 1.5, 0.5, border), 0.0);
    }

    #[test]
    fn test_reference_kernel_is_identity_at_texel_centres() {
        let src = linear_ramp(256, 256);
        assert_eq!(reference_kernel(&src, WRAP), src);
    }

    #[test]
    fn test_reference_kernel_non_tile_multiple() {
        let src = linear_ramp(100, 60);
        assert_eq!(reference_kernel(&src, WRAP), src);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_get_out_of_bounds() {
        let img: Image<f32> = Image::new(4, 4);
        img.get(4, 0);
    }

    #[test]
    #[should_panic(expected = "stride")]
    fn test_stride_less_than_width() {
        let _img: Image<f32> = Image::new_with_stride(10, 5, 8);
    }
}
