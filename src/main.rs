mod basins;
mod cli;
mod compare;
mod config;
mod download;
mod ensemble;
mod grid;
mod parquet;
mod stations;
mod temporal;

use anyhow::{Error, Result};
use clap::Parser;
use cli::{command, Cli, Commands};
use env_logger::Env;

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = cli.load_config()?;

    match &cli.command {
        Commands::Run {} => match command::run(&config).await {
            Ok(filenames) => {
                for filename in filenames {
                    println!("File saved to `{}`", filename)
                }
            }
            Err(e) => eprintln!("Error: {:#}", e),
        },
        Commands::Fetch {} => match command::fetch(&config).await {
            Ok(cache_dir) => println!("Ensemble cached in `{}`", cache_dir),
            Err(e) => eprintln!("Error: {:#}", e),
        },
        Commands::Summary { window } => match command::summary(&config, window).await {
            Ok(filename) => println!("File saved to `{}`", filename),
            Err(e) => eprintln!("Error: {:#}", e),
        },
        Commands::Stations {} => match command::stations(&config).await {
            Ok(filename) => println!("File saved to `{}`", filename),
            Err(e) => eprintln!("Error: {:#}", e),
        },
    }

    Ok(())
}
