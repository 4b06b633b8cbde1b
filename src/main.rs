//! liaison - complexity-aware routing across AI model providers
//!
//! Analyzes each request, scores every eligible provider against it and
//! routes to the best fit, tracking performance and cost as it goes.

use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use liaison::config::{KeySource, RawConfig};
use liaison::registry::ProviderRegistry;
use liaison::router::{
    ComplexityAnalyzer, Constraints, PerformanceTracker, RequestContext, Selector,
};
use liaison::{Config, Error};

#[derive(Parser)]
#[command(name = "liaison")]
#[command(about = "Complexity-aware routing of inference requests across AI model providers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the routing server
    Serve {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,

        /// Override listen address
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Validate configuration file
    Check {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,
    },

    /// Show configured providers
    Providers {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,
    },

    /// Analyze a piece of text and rank providers for it
    Analyze {
        /// Text to analyze
        text: String,

        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,

        /// Selection priority: cost, performance or quality
        #[arg(short, long)]
        priority: Option<String>,
    },
}

impl Commands {
    fn config_path(&self) -> &str {
        match self {
            Commands::Serve { config, .. }
            | Commands::Check { config }
            | Commands::Providers { config }
            | Commands::Analyze { config, .. } => config,
        }
    }
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("liaison={level},tower_http=info").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn print_key_sources(key_sources: &[(String, KeySource)]) {
    for (name, source) in key_sources {
        println!("  {:<20} key: {}", name, source);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let raw = RawConfig::from_file(cli.command.config_path())?;
    init_tracing(raw.log_level());
    let (mut config, key_sources) = Config::from_raw(raw);

    match cli.command {
        Commands::Serve { config: path, listen } => {
            tracing::info!(config = %path, "Loaded configuration");

            if let Some(addr) = listen {
                tracing::info!(listen = %addr, "Override listen address");
                config.server.listen = addr;
            }

            for (name, source) in &key_sources {
                tracing::info!(provider = %name, key_source = %source, "Provider key source");
            }

            liaison::proxy::run_server(config).await
        }

        Commands::Check { config: path } => {
            if config.providers.is_empty() {
                return Err(Error::NoProvidersConfigured.into());
            }

            let registry = ProviderRegistry::new(config.providers);
            let issues = registry.validate();

            println!("Configuration: {}", path);
            println!("Listen address: {}", config.server.listen);
            println!("Providers: {}", registry.len());
            print_key_sources(&key_sources);

            if issues.is_empty() {
                println!("No configuration problems found");
                return Ok(());
            }

            println!();
            for (name, problems) in &issues {
                for problem in problems {
                    println!("  {}: {}", name, problem);
                }
            }
            anyhow::bail!("{} provider(s) have configuration problems", issues.len())
        }

        Commands::Providers { .. } => {
            let registry = ProviderRegistry::new(config.providers);
            println!(
                "{:<20} {:<11} {:>10} {:>5} {:>6}  {}",
                "NAME", "TIER", "COST/1K", "PRIO", "KEY", "MODELS"
            );
            for p in registry.by_priority() {
                println!(
                    "{:<20} {:<11} {:>10.5} {:>5} {:>6}  {}",
                    p.name,
                    p.tier.as_str(),
                    p.cost_per_1k_tokens,
                    p.priority,
                    if p.has_api_key() { "yes" } else { "no" },
                    p.models.join(", ")
                );
            }

            let stats = registry.stats();
            println!();
            println!(
                "{} providers, {} with API keys, average cost {:.5}/1k",
                stats.total, stats.with_api_keys, stats.average_cost_per_1k
            );
            Ok(())
        }

        Commands::Analyze { text, priority, .. } => {
            let mut context_map = serde_json::Map::new();
            if let Some(priority) = priority {
                context_map.insert("priority".to_string(), priority.into());
            }
            let context = RequestContext::from_map(&context_map);

            let score = ComplexityAnalyzer::new().analyze(&text, &context);
            println!("Complexity: {} ({:.3})", score.complexity_level(), score.total_score());
            println!("  reasoning    {:.3}", score.reasoning);
            println!("  knowledge    {:.3}", score.knowledge);
            println!("  computation  {:.3}", score.computation);
            println!("  coordination {:.3}", score.coordination);

            let selector = Selector::new(
                Arc::new(ProviderRegistry::new(config.providers)),
                Arc::new(PerformanceTracker::new()),
            );
            let ranking = selector.rank(&score, &context, &Constraints::default());
            if ranking.is_empty() {
                println!();
                println!("No eligible provider");
                return Ok(());
            }

            println!();
            println!(
                "{:<4} {:<20} {:>7} {:>7} {:>7} {:>7} {:>7}",
                "RANK", "PROVIDER", "TOTAL", "CAP", "PERF", "COST", "REL"
            );
            for (i, scored) in ranking.iter().enumerate() {
                let s = &scored.scores;
                println!(
                    "{:<4} {:<20} {:>7.3} {:>7.3} {:>7.3} {:>7.3} {:>7.3}",
                    i + 1,
                    scored.provider.name,
                    s.total,
                    s.capability,
                    s.performance,
                    s.cost,
                    s.reliability
                );
            }
            Ok(())
        }
    }
}
