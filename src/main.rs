use anyhow::Result;
use clap::{Parser, Subcommand};
use dnadec::decoder;

#[derive(Parser)]
#[command(name = "dnadec")]
#[command(version = "0.1.0")]
#[command(
    about = "Maximum-likelihood decoder for DNA codes corrupted by substitution, deletion and tandem duplication",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode observed DNA reads back to machine input strings
    Decode(decoder::DecodeArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Decode(args) => {
            decoder::run(args)?;
        }
    }
    Ok(())
}
