use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "Partition and format a removable drive as FAT32", long_about = None)]
pub struct Cli {
    #[arg()]
    /// The device to format, e.g. /dev/sdb. Asks for one when omitted
    pub device: Option<PathBuf>,
    #[arg(long, short)]
    /// List removable devices and exit
    pub list: bool,
    #[arg(long, short)]
    /// Skip the label prompt and the confirmation
    pub force: bool,
    #[arg(long, short = 'n', value_name = "LABEL")]
    /// Volume label, upper-cased and cut to 11 characters
    pub label: Option<String>,
    #[arg(long)]
    /// Fail if the new partition node cannot be confirmed instead of formatting it anyway
    pub strict: bool,
    #[arg(long, short = 'D')]
    /// Write a debug log to usb-format.log
    pub debug: bool,
}

/// Parses the command line. Usage errors exit with status 1, `--help` and `--version`
/// with 0.
pub fn parse() -> Cli {
    Cli::try_parse().unwrap_or_else(|e| {
        let code = if e.use_stderr() { 1 } else { 0 };
        let _ = e.print();
        std::process::exit(code)
    })
}
