mod app;
mod cli;
mod config;
mod download;
mod file_ops;
mod scanner;
mod skin;
mod source;
mod state;
mod store;
mod worker;

use anyhow::Result;

fn main() -> Result<()> {
    cli::run()
}
