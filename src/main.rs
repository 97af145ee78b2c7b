use clap::Parser;
use imagegate::cli::{Cli, Commands, ConfigAction, ConfigOpts};
use imagegate::config::{validate_config_object, Config, DEFAULT_CONFIG_FILE};
use imagegate::logging;
use std::path::Path;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // `config init` must work before any config file exists.
    let config = match &cli.command {
        Commands::Config(ConfigOpts {
            action: ConfigAction::Init,
        }) => Config::default(),
        _ => Config::load(cli.config.as_deref())?,
    };
    logging::init(config.logging.level, cli.json_logs || config.logging.json);

    match cli.command {
        Commands::Deliver(opts) => {
            validate_config_object(&config)?;
            imagegate::cli::run_deliver(&config, &opts).await?;
        }
        Commands::GetImage(opts) => {
            validate_config_object(&config)?;
            imagegate::cli::run_get_image(&config, &opts).await?;
        }
        Commands::Compress(opts) => {
            imagegate::cli::run_compress(&opts)?;
        }
        Commands::Config(opts) => match opts.action {
            ConfigAction::Show => {
                println!("{}", serde_json::to_string_pretty(&config.redacted())?);
            }
            ConfigAction::Validate => {
                validate_config_object(&config)?;
                info!("Configuration is valid");
                println!("Configuration is valid");
            }
            ConfigAction::Init => {
                let path = cli.config.as_deref().unwrap_or(DEFAULT_CONFIG_FILE);
                if Path::new(path).exists() {
                    anyhow::bail!("Refusing to overwrite existing config file '{path}'");
                }
                Config::write_default(Path::new(path))?;
                println!("Configuration file created at {path}");
            }
        },
        Commands::Version => {
            println!("imagegate {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
