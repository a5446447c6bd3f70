// gpu/mod.rs — wgpu layer of the probe.
//
//   device   adapter selection, capability gate, device/queue, launch grid
//   texture  R32Float texture upload (pitched 2D copy) and sampler policy
//   kernel   kernel module loading, export checks, pipeline and bind group
//
// The CPU reference in `image.rs` is the model every kernel result is
// judged against.

pub mod device;
pub mod kernel;
pub mod texture;

// ---- GPU test isolation ------------------------------------------------------
//
// Some Vulkan layers (dzn on WSL2 in particular) crash during process exit
// once a device has been created. GPU tests therefore run in a child
// `cargo test` process: the `inner_*` test does the real work and prints
// `GPU_TEST_OK`, the outer wrapper only checks for that token and ignores
// the child's exit status.

/// Run a single `#[ignore]`d lib test in a child process and return its
/// combined stdout+stderr.
#[cfg(test)]
pub(crate) fn run_gpu_test_in_subprocess(test_name: &str) -> String {
    let output = std::process::Command::new(env!("CARGO"))
        .args([
            "test", "--lib", "--",
            test_name, "--exact", "--ignored", "--nocapture",
        ])
        .output()
        .unwrap_or_else(|e| panic!("failed to spawn subprocess for {test_name}: {e}"));
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    print!("{stdout}");
    eprint!("{stderr}");
    stdout + &stderr
}
