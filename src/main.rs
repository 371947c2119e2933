mod collector;
mod config;
mod dashboard;
mod models;
mod pipeline;
mod playstore;
mod preprocess;
mod report;
mod sentiment;
mod store;
mod tfidf;
mod themes;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::Settings;
use crate::playstore::PlayStoreClient;
use crate::sentiment::{HttpStarModel, SentimentClassifier};

#[derive(Parser)]
#[command(name = "review-insights")]
#[command(about = "Review analytics for the RIDE and Feres ride-hailing apps")]
#[command(version)]
struct Cli {
    /// Root of the raw/ and processed/ stores
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Where report.json is written
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape reviews into data/raw
    Collect,
    /// Clean raw reviews into data/processed
    Preprocess,
    /// Label processed reviews with a sentiment
    Sentiment,
    /// Print keyword themes per app and sentiment
    Themes,
    /// Print the comparison and write report.json
    Report,
    /// collect, preprocess, sentiment and report in one go
    Run,
    /// Start the dashboard server
    Serve,
    /// Classify one review and list its themes
    Analyze {
        #[arg(long)]
        text: String,
    },
}

async fn load_classifier(settings: &Settings) -> Result<Arc<SentimentClassifier>> {
    let model = HttpStarModel::load(&settings.classifier)
        .await
        .context("Error initializing classifier")?;
    Ok(Arc::new(SentimentClassifier::new(
        Arc::new(model),
        settings.classifier.max_chars,
    )))
}

async fn analyze_text(settings: &Settings, text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(anyhow!("Enter a review to analyze"));
    }
    let classifier = load_classifier(settings).await?;
    let sentiment = classifier.classify(Some(text)).await;
    let keywords = tfidf::extract_keywords(&[text], settings.top_n);
    let grouped = themes::non_empty(themes::group_themes(&keywords));

    println!("Sentiment: {}", sentiment);
    println!("Themes:");
    for (theme, kws) in &grouped {
        println!("  {}: {:?}", theme, kws);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::from_env().map_err(|e| anyhow!(e))?;
    if let Some(dir) = cli.data_dir {
        settings.data_dir = dir;
    }
    if let Some(dir) = cli.output_dir {
        settings.output_dir = dir;
    }

    match cli.command {
        Commands::Collect => {
            let source = PlayStoreClient::new()?;
            pipeline::run_collect(&settings, &source).await
        }
        Commands::Preprocess => pipeline::run_preprocess(&settings),
        Commands::Sentiment => {
            let classifier = load_classifier(&settings).await?;
            pipeline::run_sentiment(&settings, &classifier).await
        }
        Commands::Themes => pipeline::run_themes(&settings),
        Commands::Report => pipeline::run_report(&settings).map(|_| ()),
        Commands::Run => {
            let classifier = load_classifier(&settings).await?;
            let source = PlayStoreClient::new()?;
            pipeline::run_all(&settings, &source, &classifier).await.map(|_| ())
        }
        Commands::Serve => {
            let classifier = load_classifier(&settings).await?;
            let state = Arc::new(dashboard::AppState { settings, classifier });
            dashboard::serve(state).await
        }
        Commands::Analyze { text } => analyze_text(&settings, &text).await,
    }
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("❌ {:#}", e);
        std::process::exit(1);
    }
    info!("✅ Done");
}
