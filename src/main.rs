// main.rs — tex2d-probe binary.
//
// Exit status: 0 passed or skipped, 1 mismatches, 3 fatal driver or
// module error. clap exits 2 on usage errors before any of this runs.

use std::process::ExitCode;

use env_logger::Env;
use log::error;

use tex2d_probe::config::ProbeConfig;
use tex2d_probe::roundtrip::{self, Outcome};

const EXIT_FAILED: u8 = 1;
const EXIT_FATAL: u8 = 3;

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let config = ProbeConfig::from_args_and_env();

    match roundtrip::run(&config) {
        Ok(outcome) => {
            if let Outcome::Failed(v) = &outcome {
                for m in &v.mismatches {
                    println!("{m}");
                }
            }
            println!("{}", outcome.summary(config.width, config.height));
            match outcome {
                Outcome::Failed(_) => ExitCode::from(EXIT_FAILED),
                Outcome::Passed(_) | Outcome::Skipped => ExitCode::SUCCESS,
            }
        }
        Err(e) => {
            error!("{e}");
            eprintln!("tex2d-probe: {e}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}
