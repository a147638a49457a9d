use std::process::ExitCode;

fn main() -> ExitCode {
    stockplan_cli::run()
}
