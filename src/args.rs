use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "shop-scout")]
#[command(about = "Discovers a brand's official store for a product and extracts its facts")]
#[command(version)]
pub struct Args {
    /// Product keyword to discover (e.g. "무선선풍기 FAN PRIME 3")
    pub keyword: String,

    /// Brand name to anchor the web search
    #[arg(short, long)]
    pub brand: Option<String>,

    /// Path to a JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// WebDriver server URL (overrides config and WEBDRIVER_URL)
    #[arg(long)]
    pub webdriver_url: Option<String>,

    /// Append the finished report to this JSON-lines file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}
