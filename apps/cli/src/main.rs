//! Filesmith CLI: build a directory of files through a plugin pipeline.
//!
//! Reads `filesmith.json` (or the file given with `-c`), resolves the
//! configured plugins, and builds the source tree into the destination.

mod commands;
mod plugins;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    if let Err(err) = commands::run(cli).await {
        eprintln!("{}", commands::render_failure(&err));
        std::process::exit(1);
    }
    Ok(())
}
