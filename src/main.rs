#![allow(clippy::doc_markdown)]

mod api;
mod cli;
mod coefficients;
mod coordinator;
mod core;
mod error;
mod prelude;
mod pricing;
mod publisher;
mod quantity;
mod snapshot;
mod source;
mod statistics;
mod tables;
mod watcher;

use clap::{Parser, crate_version};
use tracing_subscriber::EnvFilter;

use crate::{
    cli::{Args, Command},
    prelude::*,
    tables::build_coefficients_table,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result {
    let _ = dotenvy::dotenv();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .without_time()
        .compact()
        .init();
    info!(version = crate_version!(), "starting…");

    let args = Args::parse();
    let store = args.coefficients.build_store()?;

    match args.command {
        Command::Serve(serve_args) => {
            serve_args.run(store, args.coefficients.coefficients_file).await?;
        }
        Command::Show(show_args) => {
            show_args.run(store).await?;
        }
        Command::Coefficients => {
            println!("{}", build_coefficients_table(&store.coefficients()));
        }
    }

    info!("done!");
    Ok(())
}
