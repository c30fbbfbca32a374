use clap::{Parser, Subcommand, ValueEnum};
use pinrelay::remote::ProviderStatus;
use pinrelay::service::PinService;

pub mod cleanup;
pub mod context;
pub mod content;
pub mod init;
pub mod list;
pub mod pin;
pub mod search;
pub mod status;
pub mod version;

#[derive(Parser)]
#[command(name = "pinrelay")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Replicate local content to pinning providers and audit where it persists", long_about = None)]
pub struct Cli {
    /// Path to config file (default: ~/.local/share/pinrelay/config.toml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Print structured JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a commented default configuration
    Init {
        /// Data directory for the embedded node
        #[arg(long)]
        data_dir: Option<String>,

        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Store a file in the local node
    Upload {
        file: String,

        /// Also pin on every provider and wait for the outcome
        #[arg(long)]
        replicate: bool,
    },

    /// Read content back out of the local node
    Retrieve {
        cid: String,

        /// File to write the content to
        #[arg(long, short)]
        output: String,
    },

    /// Pin content locally and on every provider
    Pin { cid: String },

    /// Ask every target whether it holds a pin
    Status { cid: String },

    /// List pins on every target
    List,

    /// Remove a pin from every target
    Unpin { cid: String },

    /// Look for identifiers in local storage
    Search {
        #[arg(required = true)]
        cids: Vec<String>,
    },

    /// Remove remote pins stuck in the given states
    Cleanup {
        #[arg(long, value_enum, value_delimiter = ',', required = true)]
        status: Vec<StuckStatus>,
    },

    /// Display version information
    Version,
}

/// Remote states `cleanup` may target. Pinned content is never a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StuckStatus {
    Pending,
    Searching,
    Failed,
}

impl From<StuckStatus> for ProviderStatus {
    fn from(status: StuckStatus) -> Self {
        match status {
            StuckStatus::Pending => ProviderStatus::Pending,
            StuckStatus::Searching => ProviderStatus::Searching,
            StuckStatus::Failed => ProviderStatus::Failed,
        }
    }
}

pub async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Version => {
            version::execute();
            Ok(())
        }
        Commands::Init { data_dir, force } => init::execute(cli.config, data_dir, force),
        command => {
            let config = context::load_config(cli.config.as_deref())?;
            context::init_logging(&config.logging.level);
            let service = context::open_service(&config).await?;
            run(command, &service, cli.json).await
        }
    }
}

async fn run(command: Commands, service: &PinService, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Upload { file, replicate } => content::upload(service, &file, replicate, json).await,
        Commands::Retrieve { cid, output } => content::retrieve(service, &cid, &output).await,
        Commands::Pin { cid } => pin::pin(service, &cid, json).await,
        Commands::Unpin { cid } => pin::unpin(service, &cid, json).await,
        Commands::Status { cid } => status::execute(service, &cid, json).await,
        Commands::List => list::execute(service, json).await,
        Commands::Search { cids } => search::execute(service, &cids, json).await,
        Commands::Cleanup { status } => cleanup::execute(service, &status, json).await,
        Commands::Version | Commands::Init { .. } => Ok(()),
    }
}
