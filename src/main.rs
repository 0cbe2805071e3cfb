use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use flex_agents::config::DEFAULT_CONFIG_FILE;
use flex_agents::{AppConfig, DispatchConfig, Dispatcher, McpServer, ToolRegistry, register_all_tools};

#[derive(Parser)]
#[command(name = "flex-agents", version)]
#[command(about = "MCP server for Microsoft 365 and Azure administration tools", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve MCP over stdin/stdout (default)
    Serve,
    /// Print the tool manifest as JSON
    Tools,
    /// Invoke a single tool and print the result
    Call {
        /// Name of the tool
        tool: String,

        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },
    /// Create or check configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Write a sample configuration file
    Init {
        #[arg(long, default_value = "flex-agents.toml.example")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Report missing or invalid settings
    Validate,
}

fn init_logging(verbose: bool, level: &str) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn create_tool_registry(config: &AppConfig) -> Result<Arc<ToolRegistry>> {
    let mut registry = ToolRegistry::new();
    register_all_tools(&mut registry, config).context("tool registration failed")?;
    Ok(Arc::new(registry))
}

fn write_sample_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            output.display()
        );
    }

    let content = AppConfig::sample().to_toml()?;
    std::fs::write(output, content)
        .with_context(|| format!("failed to write {}", output.display()))?;

    println!("Sample configuration written to {}", output.display());
    println!("Copy it to {} and fill in real credentials.", DEFAULT_CONFIG_FILE);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Serve);

    if let Commands::Config(ConfigCommand::Init { output, force }) = &command {
        init_logging(cli.verbose, "info");
        return write_sample_config(output, *force);
    }

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    init_logging(cli.verbose || config.server.debug, &config.server.log_level);

    match command {
        Commands::Serve => {
            let tools = create_tool_registry(&config)?;
            let server = Arc::new(McpServer::new(&config.server, tools));
            server.run_stdio().await?;
        }
        Commands::Tools => {
            let tools = create_tool_registry(&config)?;
            println!("{}", serde_json::to_string_pretty(&tools.manifest())?);
        }
        Commands::Call { tool, args } => {
            let arguments = match serde_json::from_str::<Value>(&args).context("--args is not valid JSON")? {
                Value::Object(map) => map,
                _ => anyhow::bail!("--args must be a JSON object"),
            };

            let tools = create_tool_registry(&config)?;
            let dispatcher = Dispatcher::with_config(tools, DispatchConfig::from(&config.server));

            info!(tool = %tool, "invoking tool");
            let result = dispatcher.invoke(&tool, arguments).await;
            println!("{}", serde_json::to_string_pretty(&result)?);

            if let Some(err) = result.error() {
                error!(kind = %err.kind, "tool invocation failed");
                std::process::exit(1);
            }
        }
        Commands::Config(ConfigCommand::Validate) => {
            let issues = config.validate();
            if issues.is_empty() {
                println!("Configuration is valid");
            } else {
                eprintln!("Configuration issues found:");
                for (section, problems) in &issues {
                    eprintln!("  {}:", section);
                    for problem in problems {
                        eprintln!("    - {}", problem);
                    }
                }
                std::process::exit(1);
            }
        }
        Commands::Config(ConfigCommand::Init { .. }) => unreachable!("handled before config load"),
    }

    Ok(())
}
