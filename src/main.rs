use clap::{Parser, Subcommand};
use tfemcp::core::tfemcp::TfeMcp;
use tfemcp::mcp::server::TfeMcpServer;
use tfemcp::shared::logging;

const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(
    name = "tfemcp",
    about = "An MCP server exposing Terraform Enterprise / HCP Terraform workspaces, runs and registry data.",
    version = APP_VERSION,
    disable_version_flag(true)
)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(
        long,
        short = 'c',
        value_name = "PATH",
        help = "Path to the configuration file"
    )]
    pub config: Option<String>,

    #[arg(long, short = 'V', help = "Print version")]
    pub version: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(name = "mcp", about = "Launch tfemcp as an MCP server over stdio")]
    Mcp,

    #[command(
        name = "check",
        about = "Validate the configured Terraform Enterprise credentials"
    )]
    Check,
}

#[tokio::main]
async fn main() {
    logging::init();

    let cli = Cli::parse();

    if cli.version {
        println!("{}", APP_VERSION);
        std::process::exit(0);
    }

    match &cli.command {
        Some(Commands::Mcp) => {
            logging::info("Starting tfemcp in MCP server mode");
            match init_tfemcp(&cli).await {
                Ok(tfemcp) => {
                    if let Err(err) = TfeMcpServer::serve_stdio(tfemcp).await {
                        logging::error(&format!("Error launching MCP server: {:?}", err));
                        std::process::exit(1);
                    }
                }
                Err(e) => {
                    logging::error(&format!("Failed to initialize tfemcp: {}", e));
                    std::process::exit(1);
                }
            }
        }
        Some(Commands::Check) => match init_tfemcp(&cli).await {
            Ok(tfemcp) => match tfemcp.check_credentials().await {
                Ok(details) => {
                    let account = details
                        .pointer("/data/attributes/username")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown");
                    println!(
                        "Connected to {} as {}",
                        tfemcp.config().backend.address,
                        account
                    );
                }
                Err(e) => {
                    logging::error(&format!("Credential check failed: {}", e));
                    std::process::exit(1);
                }
            },
            Err(e) => {
                logging::error(&format!("Failed to initialize tfemcp: {}", e));
                std::process::exit(1);
            }
        },
        None => {
            println!("No command specified. Use --help for usage information.");
        }
    }
}

async fn init_tfemcp(cli: &Cli) -> anyhow::Result<TfeMcp> {
    logging::info(&format!("Initializing tfemcp with config: {:?}", cli.config));
    TfeMcp::from_config_path(cli.config.clone()).await
}
