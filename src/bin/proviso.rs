use clap::Parser;
use tracing_subscriber::EnvFilter;

use proviso::cli::args::Cli;
use proviso::cli::run;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    std::process::exit(run(cli));
}
