// tests/cli.rs — Command-line behaviour of the tex2d-probe binary that does
// not need a GPU.

use assert_cmd::Command;
use predicates::prelude::*;

const FORCE_SKIP: &str = "TEX2D_PROBE_FORCE_NO_TEXTURE_SUPPORT";

#[test]
fn help_lists_flags() {
    Command::new(env!("CARGO_BIN_EXE_tex2d-probe"))
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--width"))
        .stdout(predicate::str::contains("--height"))
        .stdout(predicate::str::contains("--kernel"))
        .stdout(predicate::str::contains("--backend"));
}

#[test]
fn forced_skip_exits_zero_with_skip_line() {
    Command::new(env!("CARGO_BIN_EXE_tex2d-probe"))
        .env(FORCE_SKIP, "1")
        .assert()
        .success()
        .stdout(predicate::str::contains("Texture is not supported on the device. Skipped."))
        .stdout(predicate::str::contains("PASSED").not())
        .stdout(predicate::str::contains("FAILED").not());
}

#[test]
fn forced_skip_never_touches_the_kernel_file() {
    // A missing kernel would be fatal (exit 3) if the gate let the run through.
    Command::new(env!("CARGO_BIN_EXE_tex2d-probe"))
        .env(FORCE_SKIP, "true")
        .args(["--kernel", "no/such/kernel.wgsl"])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("Skipped."));
}

#[test]
fn unknown_backend_is_a_usage_error() {
    Command::new(env!("CARGO_BIN_EXE_tex2d-probe"))
        .args(["--backend", "cuda"])
        .assert()
        .code(2);
}
