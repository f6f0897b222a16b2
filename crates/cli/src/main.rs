use std::process::ExitCode;

fn main() -> ExitCode {
    connecthub_cli::run()
}
