//! Cangshu CLI - batch novel acquisition.

use anyhow::{Context, Result};
use cangshu::config::Config;
use cangshu::console::Console;
use cangshu::orchestrator::{BatchRequest, ScrapeOrchestrator};
use cangshu::{SiteRegistry, logging};
use clap::Parser;
use std::path::PathBuf;

/// Fetches finished novels from a site category into validated plain text.
#[derive(Parser, Debug)]
#[command(name = "cangshu")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Site name, host or URL (e.g. m.shuhaige.net).
    #[arg(long, required_unless_present = "list_sites")]
    site: Option<String>,

    /// Category name (e.g. 都市).
    #[arg(long, required_unless_present = "list_sites")]
    category: Option<String>,

    /// Number of novels to fetch.
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..))]
    count: u32,

    /// Fetch ongoing novels too.
    #[arg(long)]
    no_filter_completed: bool,

    /// Output directory; novels land under `<output>/novels/`.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Config file to use instead of the platform default.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Ignore existing checkpoints and start every novel from chapter 1.
    #[arg(long)]
    no_resume: bool,

    /// Print the registered sites and exit.
    #[arg(long)]
    list_sites: bool,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.verbose)?;
    let console = Console::new();

    console.section("Cangshu - Novel Acquisition");

    // Load configuration
    console.step("Loading configuration...");
    let mut config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;

    if let Some(output) = args.output {
        config.paths.output_directory = output;
    }
    if args.no_resume {
        config.checkpoint.resume = false;
    }

    config.validate().context("Invalid configuration")?;
    let registry = SiteRegistry::with_entries(&config.sites).context("Invalid site registration")?;
    console.success("Configuration loaded");

    if args.list_sites {
        list_sites(&registry, &console);
        return Ok(());
    }

    let (Some(site), Some(category)) = (args.site, args.category) else {
        anyhow::bail!("Both --site and --category are required");
    };

    let request = BatchRequest {
        site,
        category,
        count: args.count as usize,
        filter_completed: !args.no_filter_completed,
    };

    let orchestrator = ScrapeOrchestrator::new(config, registry);

    let token = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    match orchestrator.run_batch(&request).await {
        Ok(report) => {
            console.section("Done!");
            console.info(&format!(
                "Summary written to {}",
                orchestrator.store().root().join("summary.json").display()
            ));
            if report.interrupted {
                console.warning("Run was interrupted");
            }
            Ok(())
        }
        Err(e) if e.is_configuration() => Err(e).context("Invalid batch request"),
        Err(e) => {
            console.error(&format!("Batch aborted: {}", e));
            Ok(())
        }
    }
}

/// Prints the site registry.
fn list_sites(registry: &SiteRegistry, console: &Console) {
    console.section(&format!("Registered sites ({})", registry.all().len()));
    for site in registry.all() {
        console.info(&format!("{} ({})", site.name, site.kind));
        console.info(&format!("  URL: {}", site.base_url));
        console.info(&format!(
            "  Categories: {}",
            console.muted(&site.category_names().join(", "))
        ));
    }
}
