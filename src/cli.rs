mod coefficients;
mod home_assistant;
mod serve;
mod show;
mod source;

use clap::{Parser, Subcommand};

pub use self::{coefficients::CoefficientArgs, serve::ServeArgs, show::ShowArgs};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
#[must_use]
pub struct Args {
    #[clap(flatten)]
    pub coefficients: CoefficientArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Main command: keep the derived price sensors up to date in Home Assistant.
    #[clap(name = "serve")]
    Serve(Box<ServeArgs>),

    /// Fetch the market prices once and print the derived prices without publishing them.
    #[clap(name = "show")]
    Show(Box<ShowArgs>),

    /// Print the effective coefficients.
    #[clap(name = "coefficients")]
    Coefficients,
}
