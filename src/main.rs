use auv::cli::{Cli, Context, run_cli};
use auv::output::OutputFormatter;
use clap::Parser;
use tracing_subscriber::prelude::*;

fn main() {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!("auv v{}", env!("CARGO_PKG_VERSION"));

    let result = Context::from_cli(&cli).and_then(|context| run_cli(cli.command, &context));
    if let Err(e) = result {
        OutputFormatter::error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
