use clap::Parser;
use shop_scout::Discovery;
use shop_scout::store::JsonlSink;

mod args;
use args::Args;

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::init();

    // Parse command-line arguments
    let args = Args::parse();

    ::log::info!("starting discovery for: {}", args.keyword);

    println!("Note: discovery requires a WebDriver server (e.g., ChromeDriver).");
    println!(
        "Set WEBDRIVER_URL environment variable if not using the default http://localhost:4444"
    );

    let mut discovery = Discovery::new(&args.keyword);
    if let Some(brand) = &args.brand {
        discovery = discovery.with_brand(brand);
    }
    if let Some(path) = &args.config {
        discovery = match discovery.with_config_file(path) {
            Ok(discovery) => discovery,
            Err(e) => {
                ::log::error!("failed to load config {}: {}", path.display(), e);
                return;
            }
        };
    }
    if let Some(url) = &args.webdriver_url {
        discovery = discovery.with_webdriver_url(url);
    }

    let start_time = std::time::Instant::now();
    let result = match &args.output {
        Some(path) => {
            let sink = JsonlSink::new(path);
            discovery.run_recorded(&sink).await
        }
        None => discovery.run().await,
    };

    match result {
        Ok(report) => {
            if report.is_failure() {
                ::log::error!("discovery failed: {}", report.failure);
            }
            match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{json}"),
                Err(e) => ::log::error!("failed to render report: {}", e),
            }
            ::log::info!(
                "finished in {:.2} seconds",
                start_time.elapsed().as_secs_f64()
            );
        }
        Err(e) => {
            ::log::error!("discovery aborted: {}", e);
        }
    }
}
