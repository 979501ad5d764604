use std::process::ExitCode;

fn main() -> ExitCode {
    // Values from .env only fill gaps; the process environment wins.
    let _ = dotenvy::dotenv();
    intake_cli::run()
}
