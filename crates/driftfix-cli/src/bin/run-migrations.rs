use std::process::ExitCode;

fn main() -> ExitCode {
    driftfix_cli::main(driftfix_cli::Script::RunMigrations)
}
