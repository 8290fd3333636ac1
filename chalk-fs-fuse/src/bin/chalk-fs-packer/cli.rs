use clap::Parser;
use std::path::PathBuf;

/// Pack host files into a fresh chalk-fs image
#[derive(Parser)]
pub struct Cli {
    /// Source directory whose files are copied into the image root
    #[arg(long, short)]
    pub source: PathBuf,

    /// Output image path
    #[arg(long, short)]
    pub out: PathBuf,

    /// Image size in sectors
    #[arg(long, default_value_t = 16 * 2048)]
    pub sectors: usize,

    /// List the image root after packing
    #[arg(long)]
    pub list: bool,
}
