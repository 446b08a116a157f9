use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "corebridge-ping")]
#[command(version)]
#[command(about = "CoreBridge network connectivity testing plugin", long_about = None)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the plugin HTTP service (default)
    Serve {
        /// Port to listen on (default: $PORT or 3007)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Inspect or configure the plugin license
    License {
        #[command(subcommand)]
        command: LicenseCommands,
    },
}

#[derive(Subcommand)]
pub(crate) enum LicenseCommands {
    /// Show the stored key and validate it against the license manager
    Status,

    /// Validate a license key and store it for the service
    Configure {
        /// License key issued by the license manager
        key: String,
    },
}
