use std::process::ExitCode;

fn main() -> ExitCode {
    carseek_cli::run()
}
