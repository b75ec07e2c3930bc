use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use clap::{ArgGroup, Parser, Subcommand};
use comfy_table::Cell;
use elephant::config::{find_config_file, load_config, save_config, update_config, Config};
use elephant::export::{export_store, import_file, ExportFormat};
use elephant::metrics::{dashboard_from_store, paper_stats_from_store, top_papers, Period};
use elephant::models::identifiers::{normalize_arxiv, normalize_doi};
use elephant::models::{Category, Paper, SyncOutcome};
use elephant::pipeline::{FetchOptions, FetchSummary, Pipeline};
use elephant::recommend::{Filter, RecommendationEngine, Snapshot};
use elephant::reconcile::reconcile;
use elephant::sources::{SourceCapabilities, SourceRegistry};
use elephant::store::Store;
use elephant::ui::{
    format_number, number_cell, platform_icon, print_divider, print_section, print_status,
    priority_label, table, Spinner, Status,
};
use elephant::utils::{format_authors, format_delta, truncate_with_ellipsis};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Elephant - track and boost your scientific citations
#[derive(Parser, Debug)]
#[command(name = "elephant")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Track and boost your scientific citations across platforms", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, env = "ELEPHANT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a configuration file and create the database
    Init {
        /// Your name as it appears on publications
        #[arg(long)]
        name: String,

        #[arg(long)]
        email: Option<String>,

        /// ORCID iD (0000-0000-0000-0000)
        #[arg(long)]
        orcid: Option<String>,

        /// Author id on a platform, as PLATFORM=ID (repeatable)
        #[arg(long = "author-id", value_name = "PLATFORM=ID")]
        author_ids: Vec<String>,

        /// Database file (default: in the user data directory)
        #[arg(long)]
        database: Option<PathBuf>,

        /// Overwrite an existing configuration
        #[arg(long, short)]
        force: bool,
    },

    /// Fetch publications and citation counts
    #[command(alias = "f")]
    Fetch {
        /// Fetch every enabled platform (the default)
        #[arg(long, conflicts_with = "platform")]
        all: bool,

        /// Fetch only this platform (repeatable)
        #[arg(long, short)]
        platform: Vec<String>,

        /// Ignore the sync interval
        #[arg(long)]
        force: bool,
    },

    /// Show citation totals and their change over a period
    #[command(alias = "dash")]
    Dashboard {
        /// Also list the most cited papers
        #[arg(long, short)]
        detailed: bool,

        /// week, month, year or all
        #[arg(long, short, default_value = "month")]
        period: Period,

        /// Print JSON instead of tables
        #[arg(long)]
        json: bool,
    },

    /// Suggest ways to improve visibility
    #[command(alias = "rec")]
    Recommend {
        /// Show only the N highest ranked suggestions
        #[arg(long, short)]
        top: Option<usize>,

        /// visibility, collaboration, trending or profile
        #[arg(long, short)]
        category: Option<Category>,

        #[arg(long)]
        json: bool,
    },

    /// Follow a paper, or list followed papers
    #[command(group(
        ArgGroup::new("target")
            .required(true)
            .args(["doi", "arxiv", "title", "list"])
    ))]
    Track {
        #[arg(long)]
        doi: Option<String>,

        #[arg(long)]
        arxiv: Option<String>,

        /// Exact title (case and punctuation are ignored)
        #[arg(long)]
        title: Option<String>,

        /// List tracked papers
        #[arg(long, short)]
        list: bool,

        /// Stop tracking instead
        #[arg(long, conflicts_with = "list")]
        remove: bool,

        /// Keep tracking but raise no citation alerts for this paper
        #[arg(long, conflicts_with_all = ["list", "remove", "unmute"])]
        mute: bool,

        /// Raise citation alerts for this paper again
        #[arg(long, conflicts_with_all = ["list", "remove"])]
        unmute: bool,
    },

    /// Export all papers
    Export {
        /// csv, json or xlsx
        #[arg(long, short, default_value = "csv", value_parser = parse_format)]
        format: ExportFormat,

        /// Output file (default: citations_YYYYMMDD.<ext>)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Import papers from a previous export
    Import {
        /// csv or json (default: from the file extension)
        #[arg(long, short, value_parser = parse_format)]
        format: Option<ExportFormat>,

        path: PathBuf,
    },

    /// Configure or list citation alerts
    Alert {
        #[arg(long, conflicts_with = "disable")]
        enable: bool,

        #[arg(long)]
        disable: bool,

        /// Minimum citation increase that raises an alert
        #[arg(long)]
        threshold: Option<u32>,

        /// List recent alerts and mark them read
        #[arg(long, short)]
        list: bool,

        /// Include alerts already read
        #[arg(long, requires = "list")]
        all: bool,
    },

    /// Database statistics, or the history of one paper
    Stats {
        /// DOI or arXiv id of a paper
        #[arg(long)]
        paper: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// List platforms and their adapters
    #[command(alias = "ls")]
    Sources,
}

fn parse_format(s: &str) -> Result<ExportFormat, String> {
    s.parse().map_err(|e: elephant::export::ExportError| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = if cli.quiet { "error" } else { log_level };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("elephant={}", env_filter)),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_path = find_config_file(cli.config.as_deref());

    if let Commands::Init {
        name,
        email,
        orcid,
        author_ids,
        database,
        force,
    } = &cli.command
    {
        return init(
            &config_path,
            name,
            email.clone(),
            orcid.clone(),
            author_ids,
            database.clone(),
            *force,
        );
    }

    let config = load_config(&config_path)?;
    tracing::debug!("Using config file: {}", config_path.display());
    let store = Store::open(&config.database_path())
        .with_context(|| format!("Cannot open database {}", config.database_path().display()))?;
    let registry = SourceRegistry::from_config(&config)?;

    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Fetch {
            all: _,
            platform,
            force,
        } => {
            let options = FetchOptions {
                platforms: platform,
                force,
            };
            fetch(&config, &registry, &store, &options, cli.quiet).await
        }
        Commands::Dashboard {
            detailed,
            period,
            json,
        } => dashboard(&store, period, detailed, json),
        Commands::Recommend {
            top,
            category,
            json,
        } => recommend(&config, &registry, &store, Filter { category, top }, json),
        Commands::Track {
            doi,
            arxiv,
            title,
            list,
            remove,
            mute,
            unmute,
        } => {
            if list {
                return list_tracked(&store);
            }
            let paper = resolve_paper(&registry, &store, doi, arxiv, title).await?;
            let id = paper
                .id
                .ok_or_else(|| anyhow!("Paper '{}' has no store id", paper.title))?;
            if remove {
                if store.untrack_paper(id)? {
                    print_status(Status::Success, &format!("No longer tracking '{}'", paper.title));
                } else {
                    print_status(Status::Info, &format!("'{}' was not tracked", paper.title));
                }
            } else if mute || unmute {
                store.track_paper(id, Utc::now())?;
                store.set_tracked_alerts(id, unmute)?;
                let state = if unmute { "on" } else { "off" };
                print_status(
                    Status::Success,
                    &format!("Alerts {} for '{}'", state, paper.title),
                );
            } else if store.track_paper(id, Utc::now())? {
                print_status(Status::Success, &format!("Now tracking '{}'", paper.title));
            } else {
                print_status(Status::Info, &format!("Already tracking '{}'", paper.title));
            }
            Ok(())
        }
        Commands::Export { format, output } => {
            let now = Utc::now();
            let path = output.unwrap_or_else(|| format.default_file_name(now));
            let count = export_store(&store, format, &path, now)?;
            if !cli.quiet {
                print_status(
                    Status::Success,
                    &format!("Exported {} papers to {}", count, path.display()),
                );
            }
            Ok(())
        }
        Commands::Import { format, path } => {
            let format = match format {
                Some(format) => format,
                None => format_from_extension(&path)?,
            };
            let summary = import_file(&store, format, &path, Utc::now())?;
            if !cli.quiet {
                print_status(
                    Status::Success,
                    &format!(
                        "Imported {}: {} new papers, {} updated, {} citation snapshots",
                        path.display(),
                        summary.papers_created,
                        summary.papers_updated,
                        summary.snapshots_appended
                    ),
                );
            }
            Ok(())
        }
        Commands::Alert {
            enable,
            disable,
            threshold,
            list,
            all,
        } => alert(config, &config_path, &store, enable, disable, threshold, list, all),
        Commands::Stats { paper, json } => match paper {
            Some(key) => paper_stats(&store, &key, json),
            None => store_stats(&config, &store, json),
        },
        Commands::Sources => sources(&config, &registry, &store),
    }
}

fn init(
    path: &Path,
    name: &str,
    email: Option<String>,
    orcid: Option<String>,
    author_ids: &[String],
    database: Option<PathBuf>,
    force: bool,
) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "Configuration already exists at {}; use --force to overwrite",
            path.display()
        );
    }

    let mut config = Config::default();
    config.user.name = name.trim().to_string();
    config.user.email = email;
    config.user.orcid = orcid;
    config.database.path = database;

    for entry in author_ids {
        let (platform, id) = entry
            .split_once('=')
            .ok_or_else(|| anyhow!("Expected PLATFORM=ID, got '{}'", entry))?;
        let settings = config
            .platforms
            .entry(platform.trim().to_string())
            .or_default();
        settings.author_id = Some(id.trim().to_string());
    }

    save_config(&config, path)?;
    let store = Store::open(&config.database_path())?;

    print_status(
        Status::Success,
        &format!("Configuration written to {}", path.display()),
    );
    if let Some(db) = store.path() {
        print_status(Status::Success, &format!("Database ready at {}", db.display()));
    }
    print_status(Status::Info, "Enabled platforms:");
    for id in config.enabled_platforms() {
        println!("  {} {}", platform_icon(&id), id);
    }
    println!();
    println!("Next: run `elephant fetch` to collect your publications.");
    Ok(())
}

async fn fetch(
    config: &Config,
    registry: &SourceRegistry,
    store: &Store,
    options: &FetchOptions,
    quiet: bool,
) -> Result<()> {
    let pipeline = Pipeline::new(config, registry, store);
    let spinner = Spinner::new("Fetching publications...", !quiet);

    // Upserts are synchronous transactions, so an interrupt lands between papers.
    let result = tokio::select! {
        result = pipeline.run(options) => result,
        _ = tokio::signal::ctrl_c() => {
            spinner.finish();
            bail!("Interrupted; papers stored so far are kept");
        }
    };
    spinner.finish();
    let summary = result?;

    if !quiet {
        print_fetch_summary(&summary);
    }

    if summary.all_failed() {
        bail!("Every platform failed; nothing was fetched");
    }
    Ok(())
}

fn print_fetch_summary(summary: &FetchSummary) {
    let mut platforms = table(&["Platform", "Status", "Records", "Error"]);
    for report in &summary.platforms {
        let status = Status::from(report.outcome);
        platforms.add_row(vec![
            Cell::new(format!("{} {}", platform_icon(&report.platform), report.name)),
            Cell::new(format!("{} {}", elephant::ui::status_icon(status), report.outcome)),
            number_cell(report.records),
            Cell::new(
                report
                    .error
                    .as_deref()
                    .map(|e| truncate_with_ellipsis(e, 50))
                    .unwrap_or_default(),
            ),
        ]);
    }
    println!("{platforms}");

    print_status(
        Status::Success,
        &format!(
            "{} new papers, {} updated, {} new citations",
            summary.papers_created,
            summary.papers_updated,
            format_delta(summary.new_citations)
        ),
    );
    if summary.alerts_raised > 0 {
        print_status(
            Status::Info,
            &format!(
                "{} new alerts; see `elephant alert --list`",
                summary.alerts_raised
            ),
        );
    }

    if !summary.conflicts.is_empty() {
        print_section("Ambiguous matches");
        for conflict in &summary.conflicts {
            print_status(Status::Warning, &conflict.to_string());
        }
    }
}

fn dashboard(store: &Store, period: Period, detailed: bool, json: bool) -> Result<()> {
    let stats = dashboard_from_store(store, period, Utc::now())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    print_section(&format!("Citation dashboard ({})", period));
    let mut summary = table(&["Metric", "Value", "Change"]);
    summary.add_row(vec![
        Cell::new("Papers"),
        number_cell(format_number(stats.total_papers as u64)),
        number_cell(format_delta(stats.papers_change)),
    ]);
    summary.add_row(vec![
        Cell::new("Citations"),
        number_cell(format_number(stats.total_citations)),
        number_cell(format_delta(stats.citations_change)),
    ]);
    summary.add_row(vec![
        Cell::new("h-index"),
        number_cell(stats.h_index),
        number_cell(format_delta(stats.h_index_change)),
    ]);
    summary.add_row(vec![
        Cell::new("Average per paper"),
        number_cell(format!("{:.1}", stats.avg_citations)),
        Cell::new(""),
    ]);
    println!("{summary}");

    if !stats.platform_totals.is_empty() {
        print_section("By platform");
        let mut by_platform = table(&["Platform", "Citations"]);
        for (platform, total) in &stats.platform_totals {
            by_platform.add_row(vec![
                Cell::new(format!("{} {}", platform_icon(platform), platform)),
                number_cell(format_number(*total)),
            ]);
        }
        println!("{by_platform}");
    }

    if detailed {
        let papers = store.papers()?;
        print_section("Top papers");
        print_papers(&top_papers(&papers, 10));
    }

    let unread = store.alerts(true, 100)?.len();
    if unread > 0 {
        print_divider();
        print_status(
            Status::Info,
            &format!("{} unread alerts; see `elephant alert --list`", unread),
        );
    }
    Ok(())
}

fn print_papers(papers: &[&Paper]) {
    let mut papers_table = table(&["Title", "Year", "Authors", "Citations", "Id"]);
    for paper in papers {
        papers_table.add_row(vec![
            Cell::new(truncate_with_ellipsis(&paper.title, 50)),
            Cell::new(paper.year.map(|y| y.to_string()).unwrap_or_default()),
            Cell::new(format_authors(&paper.authors, 30)),
            number_cell(paper.citation_count()),
            Cell::new(paper.primary_id()),
        ]);
    }
    println!("{papers_table}");
}

fn recommend(
    config: &Config,
    registry: &SourceRegistry,
    store: &Store,
    filter: Filter,
    json: bool,
) -> Result<()> {
    let snapshot = Snapshot::load(store, config, registry, Utc::now())?;
    let recommendations = RecommendationEngine::new(&config.recommendations).recommend(&snapshot, &filter);

    if json {
        println!("{}", serde_json::to_string_pretty(&recommendations)?);
        return Ok(());
    }

    if recommendations.is_empty() {
        print_status(Status::Success, "No recommendations right now");
        return Ok(());
    }

    print_section("Recommendations");
    for (i, rec) in recommendations.iter().enumerate() {
        println!(
            "{:>2}. [{}] {} ({})",
            i + 1,
            priority_label(rec.priority),
            rec.title,
            rec.category
        );
        println!("    {}", rec.rationale);
        println!("    → {}", rec.action);
    }
    Ok(())
}

fn list_tracked(store: &Store) -> Result<()> {
    let tracked = store.tracked_papers()?;
    if tracked.is_empty() {
        print_status(Status::Info, "No tracked papers; add one with `elephant track --doi ...`");
        return Ok(());
    }

    let mut tracked_table = table(&["Title", "Citations", "Id", "Since", "Alerts"]);
    for entry in &tracked {
        tracked_table.add_row(vec![
            Cell::new(truncate_with_ellipsis(&entry.paper.title, 50)),
            number_cell(entry.paper.citation_count()),
            Cell::new(entry.paper.primary_id()),
            Cell::new(entry.added_at.format("%Y-%m-%d").to_string()),
            Cell::new(if entry.alert_enabled { "on" } else { "off" }),
        ]);
    }
    println!("{tracked_table}");
    Ok(())
}

/// Find the paper named by exactly one of the track selectors
async fn resolve_paper(
    registry: &SourceRegistry,
    store: &Store,
    doi: Option<String>,
    arxiv: Option<String>,
    title: Option<String>,
) -> Result<Paper> {
    if let Some(raw) = doi {
        let doi = normalize_doi(&raw).ok_or_else(|| anyhow!("'{}' is not a valid DOI", raw))?;
        if let Some(paper) = store.find_by_doi(&doi)? {
            return Ok(paper);
        }
        return lookup_doi(registry, store, &doi).await;
    }

    if let Some(raw) = arxiv {
        let id = normalize_arxiv(&raw).ok_or_else(|| anyhow!("'{}' is not an arXiv id", raw))?;
        return store
            .find_by_arxiv(&id)?
            .ok_or_else(|| anyhow!("No stored paper with arXiv id {}; run `elephant fetch` first", id));
    }

    if let Some(title) = title {
        let mut matches = store.find_by_title(&title)?;
        return match matches.len() {
            0 => Err(anyhow!("No stored paper titled '{}'", title)),
            1 => Ok(matches.remove(0)),
            n => {
                let ids: Vec<String> = matches.iter().map(Paper::primary_id).collect();
                Err(anyhow!(
                    "{} papers are titled '{}' ({}); use --doi or --arxiv",
                    n,
                    title,
                    ids.join(", ")
                ))
            }
        };
    }

    bail!("Give --doi, --arxiv or --title")
}

/// Ask the platforms for a DOI that is not stored yet and store it
async fn lookup_doi(registry: &SourceRegistry, store: &Store, doi: &str) -> Result<Paper> {
    for source in registry.doi_lookup() {
        match source.lookup_doi(doi).await {
            Ok(record) => {
                let now = Utc::now();
                let reconciled = reconcile(vec![record], now);
                if let Some(paper) = reconciled.papers.first() {
                    let outcome = store.upsert_paper(paper, now)?;
                    if let Some(paper) = store.paper(outcome.paper_id)? {
                        tracing::info!("Found {} on {}", doi, source.name());
                        return Ok(paper);
                    }
                }
            }
            Err(e) => tracing::debug!("{} lookup of {} failed: {}", source.id(), doi, e),
        }
    }
    bail!("DOI {} was not found on any enabled platform", doi)
}

fn format_from_extension(path: &Path) -> Result<ExportFormat> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| anyhow!("Cannot tell the format of {}; pass --format", path.display()))?;
    Ok(ext.parse()?)
}

#[allow(clippy::too_many_arguments)]
fn alert(
    config: Config,
    config_path: &Path,
    store: &Store,
    enable: bool,
    disable: bool,
    threshold: Option<u32>,
    list: bool,
    all: bool,
) -> Result<()> {
    if threshold == Some(0) {
        bail!("The threshold must be at least 1");
    }
    let changed = enable || disable || threshold.is_some();

    // Edit the file's own settings; `config` carries environment overrides.
    let settings = if changed {
        let saved = update_config(config_path, |file| {
            if enable || disable {
                file.alerts.enabled = enable;
            }
            if let Some(threshold) = threshold {
                file.alerts.min_citation_threshold = threshold;
            }
        })?;
        print_status(
            Status::Success,
            &format!(
                "Alerts {} (threshold: {} citations)",
                if saved.alerts.enabled { "enabled" } else { "disabled" },
                saved.alerts.min_citation_threshold
            ),
        );
        saved.alerts
    } else {
        config.alerts
    };

    if list {
        let alerts = store.alerts(!all, 50)?;
        if alerts.is_empty() {
            print_status(Status::Info, "No alerts");
        }
        for alert in &alerts {
            let status = if alert.read { Status::Skipped } else { Status::Info };
            print_status(
                status,
                &format!("{}  {}", alert.created_at.format("%Y-%m-%d %H:%M"), alert.message),
            );
        }
        store.mark_alerts_read()?;
    } else if !changed {
        print_status(
            Status::Info,
            &format!(
                "Alerts are {} (threshold: {} citations)",
                if settings.enabled { "enabled" } else { "disabled" },
                settings.min_citation_threshold
            ),
        );
    }
    Ok(())
}

fn paper_stats(store: &Store, key: &str, json: bool) -> Result<()> {
    let lookup = normalize_doi(key)
        .or_else(|| normalize_arxiv(key))
        .unwrap_or_else(|| key.trim().to_string());
    let stats = paper_stats_from_store(store, &lookup, Utc::now())?
        .ok_or_else(|| anyhow!("No stored paper with DOI or arXiv id '{}'", key))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    print_section(&truncate_with_ellipsis(&stats.paper.title, 70));
    println!("  Authors: {}", format_authors(&stats.paper.authors, 60));
    if let Some(venue) = &stats.paper.venue {
        println!("  Venue:   {}", venue);
    }
    println!("  Id:      {}", stats.paper.primary_id());

    let mut growth = table(&["Citations", "7 days", "30 days", "1 year"]);
    growth.add_row(vec![
        number_cell(stats.citations),
        number_cell(format_delta(stats.growth_7d)),
        number_cell(format_delta(stats.growth_30d)),
        number_cell(format_delta(stats.growth_1y)),
    ]);
    println!("{growth}");

    let mut per_platform = table(&["Platform", "Citations"]);
    for (platform, count) in &stats.paper.citations {
        per_platform.add_row(vec![
            Cell::new(format!("{} {}", platform_icon(platform), platform)),
            number_cell(count),
        ]);
    }
    println!("{per_platform}");

    if !stats.history.is_empty() {
        print_section("History");
        let mut history = table(&["Recorded", "Platform", "Citations"]);
        for snapshot in stats.history.iter().rev().take(20) {
            history.add_row(vec![
                Cell::new(snapshot.recorded_at.format("%Y-%m-%d %H:%M").to_string()),
                Cell::new(&snapshot.platform),
                number_cell(snapshot.citations),
            ]);
        }
        println!("{history}");
    }
    Ok(())
}

fn store_stats(config: &Config, store: &Store, json: bool) -> Result<()> {
    let papers = store.paper_count()?;
    let snapshots = store.snapshot_count()?;
    let tracked = store.tracked_papers()?.len();
    let sync = store.sync_statuses()?;

    if json {
        let value = serde_json::json!({
            "database": config.database_path(),
            "papers": papers,
            "snapshots": snapshots,
            "tracked": tracked,
            "sync": sync,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    print_section("Database");
    let mut summary = table(&["Metric", "Value"]);
    summary.add_row(vec![
        Cell::new("Location"),
        Cell::new(config.database_path().display().to_string()),
    ]);
    summary.add_row(vec![Cell::new("Papers"), number_cell(format_number(papers as u64))]);
    summary.add_row(vec![
        Cell::new("Citation snapshots"),
        number_cell(format_number(snapshots as u64)),
    ]);
    summary.add_row(vec![Cell::new("Tracked papers"), number_cell(tracked)]);
    println!("{summary}");

    if !sync.is_empty() {
        print_section("Last sync");
        let mut sync_table = table(&["Platform", "When", "Outcome", "Error"]);
        for status in &sync {
            sync_table.add_row(vec![
                Cell::new(format!("{} {}", platform_icon(&status.platform), status.platform)),
                Cell::new(status.last_sync.format("%Y-%m-%d %H:%M").to_string()),
                Cell::new(status.outcome),
                Cell::new(
                    status
                        .error_message
                        .as_deref()
                        .map(|e| truncate_with_ellipsis(e, 50))
                        .unwrap_or_default(),
                ),
            ]);
        }
        println!("{sync_table}");
    }
    Ok(())
}

fn sources(config: &Config, registry: &SourceRegistry, store: &Store) -> Result<()> {
    let mut sources_table = table(&["Platform", "Adapter", "Enabled", "Counts", "DOI lookup", "Last sync"]);

    for (id, settings) in &config.platforms {
        let adapter = registry.get(id);
        let capabilities = adapter.map(|s| s.capabilities()).unwrap_or(SourceCapabilities::empty());
        let yes_no = |flag: SourceCapabilities| {
            if capabilities.contains(flag) {
                "yes"
            } else {
                "-"
            }
        };
        let last_sync = match store.sync_status(id)? {
            Some(status) if status.outcome != SyncOutcome::Skipped => format!(
                "{} ({})",
                status.last_sync.format("%Y-%m-%d %H:%M"),
                status.outcome
            ),
            Some(status) => status.outcome.to_string(),
            None => "never".to_string(),
        };

        sources_table.add_row(vec![
            Cell::new(format!("{} {}", platform_icon(id), id)),
            Cell::new(adapter.map(|s| s.name().to_string()).unwrap_or_else(|| "-".into())),
            Cell::new(if settings.enabled { "yes" } else { "no" }),
            Cell::new(yes_no(SourceCapabilities::CITATION_COUNTS)),
            Cell::new(yes_no(SourceCapabilities::DOI_LOOKUP)),
            Cell::new(last_sync),
        ]);
    }

    println!("{sources_table}");
    Ok(())
}
