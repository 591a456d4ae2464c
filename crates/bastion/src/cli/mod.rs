//! CLI command definitions and handlers.

use std::path::PathBuf;
use std::time::Duration;

use bastion_common::ConfPaths;
use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Result, WrapErr};

use crate::config::RuntimeDefaults;
use crate::host::LinuxHost;
use crate::namespace::ContainerRegistry;
use crate::security::{ContainerRequest, compose};
use crate::signal::{ProcessTarget, SignalPlatform, parse_signal, proxy_signals, signal_table};

/// Bastion - container security policy composer
#[derive(Parser)]
#[command(name = "bastion")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Security configuration file, used ahead of the default locations
    #[arg(long, global = true)]
    pub conf: Option<PathBuf>,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Tab-separated table.
    Table,
    /// JSON.
    Json,
}

/// Signal numbering selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PlatformArg {
    /// Generic Linux numbering.
    Linux,
    /// MIPS numbering.
    Mips,
}

impl From<PlatformArg> for SignalPlatform {
    fn from(arg: PlatformArg) -> Self {
        match arg {
            PlatformArg::Linux => Self::Linux,
            PlatformArg::Mips => Self::LinuxMips,
        }
    }
}

/// Bastion commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Resolve the security configuration of a container request
    Resolve {
        /// Path to the request JSON
        request: PathBuf,

        /// Path to a JSON registry of container and pod labels
        #[arg(long)]
        registry: Option<PathBuf>,
    },

    /// Show the runtime security defaults of this host
    Defaults,

    /// List the signal table
    Signals {
        /// Signal numbering (default: this host)
        #[arg(long, value_enum)]
        platform: Option<PlatformArg>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Show whether a signal proxy forwards a signal
    Classify {
        /// Signal name or number
        signal: String,
    },

    /// Forward signals received by this process to another process
    Proxy {
        /// Target process id
        pid: i32,

        /// Liveness poll interval in milliseconds
        #[arg(long, default_value = "500")]
        poll_ms: u64,
    },
}

impl Cli {
    fn conf_paths(&self) -> ConfPaths {
        match &self.conf {
            Some(path) => ConfPaths::new().with_explicit(path.clone()),
            None => ConfPaths::new(),
        }
    }

    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        let paths = self.conf_paths();

        match self.command {
            Commands::Resolve { request, registry } => {
                let json = std::fs::read_to_string(&request)
                    .wrap_err_with(|| format!("Failed to read {}", request.display()))?;
                let request: ContainerRequest = serde_json::from_str(&json)
                    .wrap_err_with(|| format!("Invalid request {}", request.display()))?;

                let registry = match registry {
                    Some(path) => ContainerRegistry::from_json(&std::fs::read_to_string(&path)?)?,
                    None => ContainerRegistry::new(),
                };

                let defaults = RuntimeDefaults::load(&paths, &LinuxHost)?;
                let resolved = compose(&request, &defaults, &registry)?;
                println!("{}", serde_json::to_string_pretty(&resolved)?);
                Ok(())
            }

            Commands::Defaults => {
                let defaults = RuntimeDefaults::load(&paths, &LinuxHost)?;
                println!("{}", serde_json::to_string_pretty(&defaults)?);
                Ok(())
            }

            Commands::Signals { platform, format } => {
                let table = signal_table(platform.map_or_else(SignalPlatform::host, Into::into));
                match format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(table)?),
                    OutputFormat::Table => {
                        println!("NAME\tNUMBER\tPROXY");
                        for (name, number) in table.iter() {
                            println!("{}\t{}\t{}", name, number, table.classify(number));
                        }
                    }
                }
                Ok(())
            }

            Commands::Classify { signal } => {
                let number = parse_signal(&signal)?;
                println!("{}", SignalPlatform::host().table().classify(number));
                Ok(())
            }

            Commands::Proxy { pid, poll_ms } => {
                let target = ProcessTarget::new(pid)?;
                let poll = Duration::from_millis(poll_ms);
                let exited = async {
                    while target.is_alive() {
                        tokio::time::sleep(poll).await;
                    }
                };

                tracing::info!(pid, "Proxying signals");
                let forwarded = proxy_signals(&target, exited).await?;
                println!("{forwarded} signals forwarded to process {pid}");
                Ok(())
            }
        }
    }
}
