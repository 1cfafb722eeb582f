use clap::Parser;
use color_eyre::eyre::{Result, eyre};
use tracing::info;
use viridian_cli::{Args, Command, NodeConfig, logging};
use viridian_node::Node;

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    match &args.command {
        Command::Init => init(&args),
        Command::Start { genesis } => start(&args, genesis.clone()),
    }
}

fn init(args: &Args) -> Result<()> {
    let path = args.config_path();
    if path.exists() {
        return Err(eyre!("config already exists at {}", path.display()));
    }
    NodeConfig::write_default(&path)?;
    println!("wrote default configuration to {}", path.display());
    Ok(())
}

fn start(args: &Args, genesis: Option<std::path::PathBuf>) -> Result<()> {
    let mut config = NodeConfig::load(&args.config_path())?;
    if let Some(filter) = &args.log_filter {
        config.logging.filter = filter.clone();
    }
    logging::init(&config.logging);

    let genesis_path = args.genesis_path(&genesis);
    let node = Node::new(config, genesis_path);

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(async move {
        let handle = node.start()?;

        // The host consensus drives the middleware; this process parks until
        // it is told to stop.
        tokio::signal::ctrl_c().await?;
        info!("shutdown signal received, draining tasks");
        handle.shutdown().await;
        Ok(())
    })
}
