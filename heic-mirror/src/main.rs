use std::io;
use std::path::PathBuf;

use clap::Parser;
use heic_mirror::config::{RunConfig, TargetFormat};
use heic_mirror::run;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Drive folder id to mirror from
    root_folder_id: String,
    /// Local directory the converted tree is written under
    local_root: PathBuf,
    #[arg(short, long)]
    verbose: bool,
    /// Raster format converted images are written in
    #[arg(short, long, value_enum, default_value_t = TargetFormat::Png)]
    format: TargetFormat,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).expect("default subscriber");

    let config = RunConfig::new(cli.root_folder_id, cli.local_root, cli.verbose, cli.format);
    run::run_conversion(&config, io::stdin().lock()).await
}
