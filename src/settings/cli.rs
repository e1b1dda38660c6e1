use super::Parser;

#[derive(Parser, Debug)]
#[command(name = "tokenvault", about = "Token lifecycle service with a two-tier cache")]
pub struct Cli {
    /// Settings file; defaults to settings/dev.toml (debug) or settings/release.toml.
    #[arg(long)]
    pub settings: Option<String>,

    /// Overrides `log.filter` from the settings file.
    #[arg(long)]
    pub log_filter: Option<String>,
}
