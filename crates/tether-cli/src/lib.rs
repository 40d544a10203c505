//! Tether command-line entry point
//!
//! Parses configuration, installs logging, and serves the protocol over
//! stdin/stdout (or the files named by `--input`/`--output`). Native
//! modules are linked in by the embedding binary and handed to [`run`] as
//! a [`ModuleRegistry`].

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tether_engine::ModuleRegistry;
use tether_kernel::{Channel, HostLoop, Kernel, KernelOptions};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug, Clone)]
#[command(name = "tether")]
#[command(about = "Object bridge kernel speaking line-delimited JSON", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Directory packages are unpacked into (default: a temporary directory)
    #[arg(long, env = "TETHER_INSTALL_DIR")]
    pub install_dir: Option<PathBuf>,

    /// Log filter, e.g. `warn` or `tether_kernel=debug`
    #[arg(long, env = "TETHER_LOG", default_value = "warn")]
    pub log_level: String,

    /// Log every protocol line at trace level
    #[arg(long)]
    pub trace_wire: bool,

    /// Read requests from this file instead of stdin
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Write responses to this file instead of stdout
    #[arg(long)]
    pub output: Option<PathBuf>,
}

impl Cli {
    pub fn kernel_options(&self) -> KernelOptions {
        let mut options = KernelOptions::default().with_trace_wire(self.trace_wire);
        if let Some(dir) = &self.install_dir {
            options = options.with_install_dir(dir);
        }
        options
    }

    /// Filter directive for the log subscriber.
    pub fn log_filter(&self) -> String {
        if self.trace_wire {
            format!("{},tether::wire=trace", self.log_level)
        } else {
            self.log_level.clone()
        }
    }
}

/// Install the stderr log subscriber. Stdout carries the protocol.
pub fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(cli.log_filter())
        .with_context(|| format!("invalid log filter '{}'", cli.log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
}

/// Serve the protocol until the host exits or closes the input.
/// Returns the exit code requested by the host.
pub fn run(cli: &Cli, registry: ModuleRegistry) -> anyhow::Result<i32> {
    let reader: Box<dyn BufRead> = match &cli.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("cannot open input {}", path.display()))?,
        )),
        None => Box::new(io::stdin().lock()),
    };
    let writer: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("cannot create output {}", path.display()))?,
        )),
        None => Box::new(io::stdout().lock()),
    };

    tracing::info!(modules = registry.len(), "starting kernel");
    let kernel = Kernel::new(cli.kernel_options(), registry);
    let channel = Channel::new(reader, writer).with_trace_wire(cli.trace_wire);
    let mut host = HostLoop::new(kernel, channel);
    let code = host.run().context("protocol channel failed")?;
    Ok(code)
}
