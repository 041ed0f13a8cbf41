//! Docent CLI: ask questions about a document.
//!
//! Reads a PDF, web page or text file once through a pipeline of LLM stage
//! agents (reader, summarizer, critic, innovator), caches the analysis, then
//! answers questions against it.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
