//! Property tests for the CPU reference sampler and launch geometry.
//!
//! Point sampling at texel centres with wrap addressing must hand back the
//! stored value for every texel, at any size, and the launch grid must
//! cover every texel exactly once.

use proptest::prelude::*;
use tex2d_probe::gpu::device::WorkgroupSize;
use tex2d_probe::image::{linear_ramp, reference_kernel, resolve_texel, Image};
use tex2d_probe::verify::compare;
use wgpu::AddressMode;

// ── Strategies ───────────────────────────────────────────────────────────

/// A texture side length (1..=300 keeps tests fast but crosses tile edges).
fn side() -> impl Strategy<Value = usize> {
    1usize..=300
}

fn arb_mode() -> impl Strategy<Value = AddressMode> {
    prop_oneof![
        Just(AddressMode::Repeat),
        Just(AddressMode::ClampToEdge),
        Just(AddressMode::MirrorRepeat),
        Just(AddressMode::ClampToBorder),
    ]
}

// ── Properties ───────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn reference_kernel_is_identity(w in side(), h in side()) {
        let src = linear_ramp(w, h);
        let out = reference_kernel(&src, [AddressMode::Repeat; 2]);
        prop_assert!(compare(&src, &out).passed());
    }

    #[test]
    fn texel_centres_ignore_address_mode(w in 1usize..=64, h in 1usize..=64, mu in arb_mode(), mv in arb_mode()) {
        let src = linear_ramp(w, h);
        prop_assert_eq!(reference_kernel(&src, [mu, mv]), src);
    }

    #[test]
    fn source_is_deterministic(w in side(), h in side()) {
        prop_assert_eq!(linear_ramp(w, h), linear_ramp(w, h));
    }

    #[test]
    fn in_range_texels_resolve_to_themselves(size in 1usize..=512, mode in arb_mode()) {
        for t in [0, size / 2, size - 1] {
            prop_assert_eq!(resolve_texel(t as i64, size, mode), Some(t));
        }
    }

    #[test]
    fn repeat_is_periodic(t in -2000i64..2000, size in 1usize..=256) {
        prop_assert_eq!(
            resolve_texel(t, size, AddressMode::Repeat),
            resolve_texel(t + size as i64, size, AddressMode::Repeat)
        );
    }

    #[test]
    fn grid_covers_every_texel_once(w in 1u32..=1000, h in 1u32..=1000) {
        let tile = WorkgroupSize::TILE;
        let (gx, gy) = tile.dispatch_size(w, h);
        // Covers the domain...
        prop_assert!(gx * tile.x >= w && gy * tile.y >= h);
        // ...with no whole workgroup lying outside it.
        prop_assert!((gx - 1) * tile.x < w && (gy - 1) * tile.y < h);
    }

    #[test]
    fn single_corruption_is_located(w in 1usize..=64, h in 1usize..=64, x in 0usize..64, y in 0usize..64) {
        let (x, y) = (x % w, y % h);
        let src = linear_ramp(w, h);
        let mut out: Image<f32> = src.clone();
        out.set(x, y, -1.0);
        let v = compare(&src, &out);
        prop_assert_eq!(v.mismatches.len(), 1);
        prop_assert_eq!((v.mismatches[0].row, v.mismatches[0].col), (y, x));
    }
}
