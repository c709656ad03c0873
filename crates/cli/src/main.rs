use std::process::ExitCode;

fn main() -> ExitCode {
    surplus_cli::run()
}
