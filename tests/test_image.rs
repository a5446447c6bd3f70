// tests/test_image.rs — Integration tests for Image<T>, the source ramp and
// the CPU reference sampler.
//
// These run with `cargo test --test test_image` and only use the public API.

use tex2d_probe::image::{linear_ramp, reference_kernel, resolve_texel, sample_point, Image};
use wgpu::AddressMode;

const WRAP: [AddressMode; 2] = [AddressMode::Repeat; 2];

// ===== Image construction & basic access =====

#[test]
fn image_new_zero_initialized() {
    let img: Image<f32> = Image::new(100, 50);
    assert_eq!(img.width(), 100);
    assert_eq!(img.height(), 50);
    assert_eq!(img.get(0, 0), 0.0);
    assert_eq!(img.get(99, 49), 0.0);
}

#[test]
fn image_from_vec_layout() {
    // 3×2 image, row-major:
    //  [10, 20, 30]
    //  [40, 50, 60]
    let img = Image::from_vec(3, 2, vec![10.0f32, 20.0, 30.0, 40.0, 50.0, 60.0]);
    assert_eq!(img.get(0, 0), 10.0);
    assert_eq!(img.get(2, 0), 30.0);
    assert_eq!(img.get(0, 1), 40.0);
    assert_eq!(img.get(2, 1), 60.0);
}

#[test]
fn image_stride_does_not_affect_pixel_access() {
    let mut img: Image<f32> = Image::new_with_stride(3, 2, 8);
    img.set(0, 0, 1.0);
    img.set(2, 0, 2.0);
    img.set(0, 1, 3.0);
    img.set(2, 1, 4.0);

    assert_eq!(img.get(2, 1), 4.0);
    assert_eq!(img.row(0), &[1.0, 0.0, 2.0]);
    assert_eq!(img.pitch_bytes(), 32);
}

// ===== Source ramp =====

#[test]
fn ramp_holds_row_major_index() {
    let img = linear_ramp(256, 256);
    for (x, y, v) in img.pixels() {
        assert_eq!(v, (y * 256 + x) as f32, "wrong value at ({x}, {y})");
    }
}

#[test]
fn ramp_is_exact_at_largest_default_index() {
    let img = linear_ramp(256, 256);
    assert_eq!(img.get(255, 255), 65535.0);
}

// ===== Reference sampler =====

#[test]
fn wrap_addressing_folds_out_of_range_texels() {
    assert_eq!(resolve_texel(-1, 4, AddressMode::Repeat), Some(3));
    assert_eq!(resolve_texel(4, 4, AddressMode::Repeat), Some(0));
    assert_eq!(resolve_texel(9, 4, AddressMode::Repeat), Some(1));
}

#[test]
fn clamp_and_border_addressing() {
    assert_eq!(resolve_texel(-3, 4, AddressMode::ClampToEdge), Some(0));
    assert_eq!(resolve_texel(7, 4, AddressMode::ClampToEdge), Some(3));
    assert_eq!(resolve_texel(4, 4, AddressMode::ClampToBorder), None);
}

#[test]
fn wrapped_sample_past_the_edge_reads_opposite_side() {
    let img = linear_ramp(4, 4);
    // u just above 1.0 lands in texel 0 of the same row.
    assert_eq!(sample_point(&img, 1.1, 0.1, WRAP), img.get(0, 0));
    // v below 0.0 wraps to the last row.
    assert_eq!(sample_point(&img, 0.1, -0.1, WRAP), img.get(0, 3));
}

#[test]
fn reference_kernel_reproduces_default_source() {
    let src = linear_ramp(256, 256);
    assert_eq!(reference_kernel(&src, WRAP), src);
}
