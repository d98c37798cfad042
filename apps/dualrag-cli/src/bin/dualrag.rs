use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

use dualrag_core::config::expand_path;
use dualrag_core::traits::DocumentFeed;
use dualrag_core::types::{Query, Scope};
use dualrag_hybrid::format_context;
use dualrag_cli::{build_retriever, init_tracing, load_settings, prepare_bundle, write_bundle};
use dualrag_vector::{HttpFeed, TextDirFeed};

#[derive(Parser)]
#[command(name = "dualrag")]
#[command(about = "Query the assistant's indexes and build the bundled dataset")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ScopeArg {
    All,
    Guidance,
    Events,
}

impl From<ScopeArg> for Scope {
    fn from(s: ScopeArg) -> Self {
        match s {
            ScopeArg::All => Scope::All,
            ScopeArg::Guidance => Scope::GuidanceOnly,
            ScopeArg::Events => Scope::DomainOnly,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run one retrieval and print the ranked hits and the rendered context
    Query {
        text: String,
        #[arg(short = 'n', long)]
        top_n: Option<usize>,
        #[arg(long)]
        floor: Option<f32>,
        #[arg(short, long, value_enum, default_value = "all")]
        scope: ScopeArg,
        /// Print the raw retrieval as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write the fallback dataset from the events feed or a guidance directory
    Bundle {
        /// Output file; defaults to `refresh.guidance_fallback_path` with
        /// `--from-dir`, `refresh.fallback_path` otherwise
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Read guidance text files from this directory instead of the feed
        #[arg(long)]
        from_dir: Option<PathBuf>,
        /// Events feed URL; defaults to `refresh.feed_url`
        #[arg(long)]
        feed_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load_settings()?;
    init_tracing(&settings.log, true);

    match cli.command {
        Commands::Query { text, top_n, floor, scope, json } => {
            let (retriever, _scheduler) = build_retriever(&settings).await?;
            let query = Query::new(text, top_n.unwrap_or(settings.retrieval.top_n))
                .with_floor(floor.unwrap_or(settings.retrieval.similarity_floor))
                .with_scope(scope.into());
            let retrieval = retriever.retrieve(&query).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&retrieval)?);
                return Ok(());
            }
            println!("🔍 {}", query.text);
            println!("   local: {:?}  remote: {:?}", retrieval.local, retrieval.remote);
            if retrieval.results.is_empty() {
                println!("\nNo results.");
            }
            for (i, hit) in retrieval.results.iter().enumerate() {
                let first_line = hit.document.text.lines().next().unwrap_or_default();
                println!("{:>2}. [{:?}] {:.3}  {}  {}", i + 1, hit.source, hit.score, hit.id(), first_line);
            }
            println!("\n{}", format_context(&retrieval.results));
        }

        Commands::Bundle { out, from_dir, feed_url } => {
            let out = match (out, &from_dir) {
                (Some(out), _) => out,
                (None, Some(_)) => match &settings.refresh.guidance_fallback_path {
                    Some(path) => expand_path(path),
                    None => anyhow::bail!("no output for a guidance bundle: pass --out or set refresh.guidance_fallback_path"),
                },
                (None, None) => expand_path(&settings.refresh.fallback_path),
            };
            let feed: Box<dyn DocumentFeed> = match (from_dir, feed_url.or(settings.refresh.feed_url.clone())) {
                (Some(dir), _) => Box::new(TextDirFeed::new(dir)),
                (None, Some(url)) => {
                    Box::new(HttpFeed::new(url, Duration::from_millis(settings.refresh.feed_timeout_ms))?)
                }
                (None, None) => anyhow::bail!("nothing to bundle: pass --from-dir or --feed-url, or set refresh.feed_url"),
            };

            let spinner = ProgressBar::new_spinner();
            spinner.set_message(format!("fetching {}", feed.name()));
            spinner.enable_steady_tick(Duration::from_millis(100));
            let records = feed.fetch().await.with_context(|| format!("fetch {}", feed.name()))?;
            spinner.finish_and_clear();

            let pb = ProgressBar::new(records.len() as u64);
            pb.set_style(
                ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
                    .progress_chars("##-"),
            );
            let (records, dropped) = prepare_bundle(records, &pb);
            pb.finish_with_message("checked");

            write_bundle(&out, &records)?;
            println!("✅ Wrote {} records to {}", records.len(), out.display());
            if dropped > 0 {
                println!("⚠️  Dropped {dropped} blank or duplicate records");
            }
        }
    }
    Ok(())
}
