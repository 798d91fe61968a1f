//! # docs-harness
//!
//! A documentation ingestion, indexing, and hybrid-search tool.
//!
//! ```text
//! Fetchers → Pipelines → Scraper Strategies → Store (FTS5 + sqlite-vec) → Search Service → CLI
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use docs_harness::config::{self, ScrapeDefaults};
use docs_harness::embedding::create_embedder;
use docs_harness::job::JobPipeline;
use docs_harness::models::{Scope, ScrapeMode, ScrapeOptions};
use docs_harness::search_service::SearchService;
use docs_harness::store::SqliteStore;

#[derive(Parser)]
#[command(
    name = "dh",
    about = "docs-harness — documentation ingestion and hybrid-search CLI",
    version
)]
struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, default_value = "./config/dh.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema
    Init,

    /// Queue a crawl and wait for it to finish
    Scrape {
        /// URL to crawl: http(s)://, file://, or a github.com repo URL
        url: String,
        /// Library name to index under
        library: String,
        /// Version name (semver, partial, or omitted for unversioned)
        #[arg(long, default_value = "")]
        version: String,
        /// Crawl scope: subpages, hostname, or domain
        #[arg(long, default_value = "subpages")]
        scope: String,
        #[arg(long)]
        max_pages: Option<u32>,
        #[arg(long)]
        max_depth: Option<u32>,
    },

    /// Search indexed documents
    Search {
        library: String,
        query: String,
        #[arg(long)]
        version: Option<String>,
    },

    /// List indexed libraries and their versions
    Libraries,

    /// List known jobs
    Jobs,

    /// Remove an indexed version
    RemoveVersion { library: String, version: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    let embedding_dim = cfg.embedding.dims.unwrap_or(1536);
    let store = Arc::new(SqliteStore::open(&cfg.store.path, embedding_dim).await?);
    store.reconcile_on_startup().await?;

    let embedder = Arc::from(create_embedder(&cfg.embedding)?);
    let jobs = Arc::new(JobPipeline::new(
        Arc::clone(&store),
        Arc::clone(&embedder),
        cfg.scrape.clone(),
    ));
    jobs.start();

    let service = SearchService::new(
        Arc::clone(&store),
        Arc::clone(&jobs),
        embedder,
        cfg.retrieval.clone(),
    );

    match cli.command {
        Commands::Init => {
            println!("Database initialized at {}.", cfg.store.path.display());
        }
        Commands::Scrape {
            url,
            library,
            version,
            scope,
            max_pages,
            max_depth,
        } => {
            let options = build_scrape_options(&url, &library, &version, &scope, max_pages, max_depth, &cfg.scrape)?;
            let job_id = service.scrape(options).await?;
            println!("Queued job {job_id}");
            jobs.wait_for_job_completion(job_id).await?;
            if let Some(job) = jobs.get_job(job_id).await {
                println!("Finished with status {:?}", job.status);
                if let Some(err) = job.error {
                    println!("Error: {err}");
                }
            }
        }
        Commands::Search { library, query, version } => {
            let results = service.search(&library, version.as_deref(), &query).await?;
            for r in results {
                println!("[{:.4}] {}", r.score, r.metadata);
            }
        }
        Commands::Libraries => {
            for lib in service.list_libraries().await? {
                println!("{}", lib.library);
                for v in lib.versions {
                    println!(
                        "  {} {:?} ({} docs)",
                        if v.name.is_empty() { "(unversioned)" } else { &v.name },
                        v.status,
                        v.document_count
                    );
                }
            }
        }
        Commands::Jobs => {
            for job in service.list_jobs().await {
                println!("{} {} {:?} {:?}", job.id, job.library, job.version, job.status);
            }
        }
        Commands::RemoveVersion { library, version } => {
            service.remove_version(&library, &version).await?;
            println!("Removed {library}@{version}");
        }
    }

    Ok(())
}

fn build_scrape_options(
    url: &str,
    library: &str,
    version: &str,
    scope: &str,
    max_pages: Option<u32>,
    max_depth: Option<u32>,
    defaults: &ScrapeDefaults,
) -> anyhow::Result<ScrapeOptions> {
    let scope = match scope {
        "subpages" => Scope::Subpages,
        "hostname" => Scope::Hostname,
        "domain" => Scope::Domain,
        other => anyhow::bail!("unknown scope: {other}"),
    };
    Ok(ScrapeOptions {
        url: url.to_string(),
        library: library.to_string(),
        version: version.to_string(),
        scope,
        max_pages: max_pages.unwrap_or(defaults.max_pages),
        max_depth: max_depth.unwrap_or(defaults.max_depth),
        max_concurrency: defaults.max_concurrency,
        follow_redirects: defaults.follow_redirects,
        ignore_errors: defaults.ignore_errors,
        scrape_mode: ScrapeMode::Fetch,
        include_patterns: vec![],
        exclude_patterns: None,
        headers: vec![],
    })
}
