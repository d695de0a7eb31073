use bailian::{cli::Cli, run};
use clap::Parser as _;
use color_eyre::Result;
use engine::config::load_config;

#[tokio::main]
pub async fn main() -> Result<()> {
    pretty_env_logger::init();
    color_eyre::install()?;
    let cli = Cli::parse();
    let mut config = load_config()?.unwrap_or_default();
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }
    run(cli.command, config).await
}
