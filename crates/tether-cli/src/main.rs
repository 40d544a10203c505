//! `tether` binary

use clap::Parser;
use tether_cli::{init_logging, run, Cli};
use tether_engine::ModuleRegistry;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let code = run(&cli, ModuleRegistry::new())?;
    std::process::exit(code);
}
