use clap::Parser;
use fxgrid::cli::{run, Cli};
use fxgrid::logging::init_logging;

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_logging(&cli.log_level) {
        eprintln!("error: {e}");
        return (&e).into();
    }
    run(cli)
}
