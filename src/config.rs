use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
pub struct Config {
    #[clap(help = "Path to the table file (.dbf)")]
    pub table: PathBuf,

    #[clap(default_value = "false", long, help = "Print the header and column list only")]
    pub schema: bool,

    #[clap(default_value = "false", long, help = "Print live record count only")]
    pub count: bool,
}
