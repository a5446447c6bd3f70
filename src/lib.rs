// tex2d-probe: texture-sampling round-trip probe for wgpu compute kernels
//
// Uploads a deterministic float ramp into an R32Float texture, samples it
// from a compute kernel with point filtering and wrap addressing, and
// checks that every texel comes back unchanged.

pub mod config;
pub mod gpu;
pub mod image;
pub mod roundtrip;
pub mod verify;
