use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "warden", version)]
#[command(about = "Warden - supervise services with dependency-aware lifecycles")]
pub struct Cli {
    /// Server address for client commands
    #[arg(long, default_value_t = format!("http://{}", warden::DEFAULT_LISTEN_ADDR))]
    pub addr: String,

    /// Basic-auth username
    #[arg(long)]
    pub user: Option<String>,

    /// Basic-auth password
    #[arg(long)]
    pub pass: Option<String>,

    /// Extra PEM root certificate file
    #[arg(long)]
    pub cacert: Option<PathBuf>,

    /// Directory of PEM root certificates
    #[arg(long)]
    pub capath: Option<PathBuf>,

    /// Skip TLS certificate verification
    #[arg(long)]
    pub insecure: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the supervisor daemon
    Serve {
        /// Listen address
        #[arg(short = 'a', long, default_value = warden::DEFAULT_LISTEN_ADDR)]
        addr: String,

        /// Base directory; manifests live in "services" underneath it
        #[arg(short = 'd', long, default_value = ".")]
        dir: PathBuf,

        /// Instance name (also the auth realm)
        #[arg(short = 'n', long, default_value = "warden")]
        name: String,

        /// Enable all services at startup
        #[arg(
            short = 'e',
            long,
            default_value_t = true,
            action = ArgAction::Set,
            value_name = "BOOL"
        )]
        enable_all: bool,

        /// Password file of user:bcrypt-hash lines; enables basic auth
        #[arg(short = 'p', long)]
        passfile: Option<PathBuf>,

        /// Generate a credential from USER:PASS, print the hash, and
        /// enable basic auth with it
        #[arg(short = 'g', long, value_name = "USER:PASS")]
        genpass: Option<String>,
    },
    /// List service names
    Services,
    /// Show status for all or selected services
    Status {
        /// Service names (all when empty)
        names: Vec<String>,
    },
    /// Show full details for one service
    Info { name: String },
    /// Enable a service
    Enable { name: String },
    /// Disable a service
    Disable { name: String },
    /// Restart a service
    Restart { name: String },
    /// Clear a service fault
    Clear { name: String },
    /// Show a service's log, or the consolidated log with no name
    Log { name: Option<String> },
    /// Interactive status screen
    Ui,
}
