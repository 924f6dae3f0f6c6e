use std::process::ExitCode;

fn main() -> ExitCode {
    studyaid_lib::run()
}
