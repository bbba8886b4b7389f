use analytics::{AnalyticsError, AnalyticsService, RetryPolicy};
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, FixedOffset, Utc};
use clap::{Args, Parser, Subcommand};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, Table};
use configuration::{Config, LogFormat, LoggingSettings, load_config};
use core_types::{Aggregate, Analytics, Item, ItemKind, NewItem, Page};
use database::{DEFAULT_PAGE_LIMIT, ItemRepository, PgAnalyticsStore, PgPool, connect, run_migrations};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// The main entry point for the sales tracker.
#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env, if present, before reading APP__ overrides.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = load_config(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    let _log_guard = init_tracing(&config.logging, cli.log_format)?;

    let db_pool = connect(&config.database)
        .await
        .context("Failed to connect to the database")?;

    match cli.command {
        Commands::Migrate => {
            run_migrations(&db_pool)
                .await
                .context("Failed to run database migrations")?;
            println!("Migrations applied.");
        }
        Commands::Item(command) => handle_item(command, db_pool, &config).await?,
        Commands::Analytics(args) => handle_analytics(args, db_pool, &config).await?,
    }

    Ok(())
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Records income and expense items and reports analytics over date ranges.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Missing files fall back to defaults.
    #[arg(long, short, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Overrides `logging.format` from the configuration.
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations.
    Migrate,
    /// Create, inspect, change or remove items.
    #[command(subcommand)]
    Item(ItemCommand),
    /// Aggregate income and expenses over a date range.
    Analytics(AnalyticsArgs),
}

#[derive(Subcommand)]
enum ItemCommand {
    /// Record a new item.
    Add(ItemArgs),
    /// Show one item.
    Get { id: i64 },
    /// List items, newest first.
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = DEFAULT_PAGE_LIMIT)]
        limit: u32,
    },
    /// Replace the fields of an existing item.
    Update {
        id: i64,
        #[command(flatten)]
        item: ItemArgs,
    },
    /// Remove an item.
    Delete { id: i64 },
}

#[derive(Args)]
struct ItemArgs {
    /// "income" or "expense".
    #[arg(long)]
    kind: ItemKind,

    /// Non-negative amount, e.g. 12.50.
    #[arg(long)]
    amount: Decimal,

    /// When the item occurred (RFC 3339, e.g. 2024-01-15T09:30:00Z).
    #[arg(long)]
    date: DateTime<FixedOffset>,

    #[arg(long)]
    category: Option<String>,

    #[arg(long)]
    description: Option<String>,
}

impl ItemArgs {
    fn into_new_item(self) -> Result<NewItem> {
        if self.amount.is_sign_negative() {
            return Err(anyhow!("amount must not be negative, got {}", self.amount));
        }
        Ok(NewItem {
            kind: self.kind,
            amount: self.amount,
            occurred_at: self.date.with_timezone(&Utc),
            category: self.category,
            description: self.description,
        })
    }
}

#[derive(Args)]
struct AnalyticsArgs {
    /// Start of the window, inclusive (RFC 3339).
    #[arg(long)]
    from: Option<DateTime<FixedOffset>>,

    /// End of the window, inclusive (RFC 3339).
    #[arg(long)]
    to: Option<DateTime<FixedOffset>>,

    /// Print the result as JSON instead of tables.
    #[arg(long)]
    json: bool,
}

// ==============================================================================
// Logging
// ==============================================================================

/// Installs the global subscriber. The returned guard flushes the log file on drop.
fn init_tracing(
    settings: &LoggingSettings,
    format_override: Option<LogFormat>,
) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .with_context(|| format!("Invalid log level '{}'", settings.level))?;

    // Logs go to stderr so that stdout stays clean for `--json`.
    let (writer, guard) = match &settings.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "sales-tracker.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(non_blocking), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stderr), None),
    };

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(writer);
    match format_override.unwrap_or(settings.format) {
        LogFormat::Full => tracing::subscriber::set_global_default(builder.finish())?,
        LogFormat::Compact => tracing::subscriber::set_global_default(builder.compact().finish())?,
    }

    Ok(guard)
}

// ==============================================================================
// Item Command Logic
// ==============================================================================

async fn handle_item(command: ItemCommand, db_pool: PgPool, config: &Config) -> Result<()> {
    let repo = ItemRepository::new(db_pool).with_retry(RetryPolicy::from(&config.retry));

    match command {
        ItemCommand::Add(args) => {
            let id = repo.create(&args.into_new_item()?).await?;
            println!("Created item {id}.");
        }
        ItemCommand::Get { id } => {
            let item = repo
                .get(id)
                .await
                .with_context(|| format!("Failed to fetch item {id}"))?;
            println!("{}", items_table(std::slice::from_ref(&item)));
        }
        ItemCommand::List { page, limit } => {
            let page = repo.list_page(page, limit).await?;
            print_page(&page);
        }
        ItemCommand::Update { id, item } => {
            repo.update(id, &item.into_new_item()?)
                .await
                .with_context(|| format!("Failed to update item {id}"))?;
            println!("Updated item {id}.");
        }
        ItemCommand::Delete { id } => {
            repo.delete(id)
                .await
                .with_context(|| format!("Failed to delete item {id}"))?;
            println!("Deleted item {id}.");
        }
    }

    Ok(())
}

fn print_page(page: &Page<Item>) {
    if page.items.is_empty() {
        println!("No items found.");
        return;
    }
    println!("{}", items_table(&page.items));
    println!(
        "Page {} ({} per page), {} items in total.",
        page.page, page.limit, page.total
    );
}

// ==============================================================================
// Analytics Command Logic
// ==============================================================================

async fn handle_analytics(args: AnalyticsArgs, db_pool: PgPool, config: &Config) -> Result<()> {
    let store = Arc::new(PgAnalyticsStore::new(db_pool));
    let service = AnalyticsService::new(store, &config.analytics, &config.retry);

    let from = args.from.map(|from| from.with_timezone(&Utc));
    let to = args.to.map(|to| to.with_timezone(&Utc));

    let outcome = match service.validate(from, to) {
        Ok(range) => service.get_analytics_until(&range, interrupted()).await,
        Err(err) => Err(err),
    };
    let analytics = outcome.map_err(describe)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&analytics)?);
    } else {
        print_analytics(&analytics);
    }
    Ok(())
}

/// Resolves on Ctrl-C. Never resolves if the signal handler cannot be installed.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Turns an analytics failure into what the user is shown: the category code
/// and a message without backend details. The full error is already logged.
fn describe(err: AnalyticsError) -> anyhow::Error {
    anyhow!("{} ({})", err.public_message(), err.category().as_str())
}

fn print_analytics(analytics: &Analytics) {
    let mut summary = Table::new();
    summary.load_preset(UTF8_FULL);
    summary.set_header(header(&["Type", "Count", "Sum", "Average", "Median", "90th pct"]));
    for kind in ItemKind::ALL {
        summary.add_row(aggregate_row(kind, analytics.aggregate(kind)));
    }
    println!("{summary}");

    if analytics.details.is_empty() {
        println!("No items in this period.");
    } else {
        println!("{}", items_table(&analytics.details));
    }
}

fn aggregate_row(kind: ItemKind, aggregate: &Aggregate) -> Vec<Cell> {
    vec![
        Cell::new(kind),
        Cell::new(aggregate.count),
        Cell::new(money(aggregate.sum)),
        Cell::new(money(aggregate.avg)),
        Cell::new(money(aggregate.median)),
        Cell::new(money(aggregate.percent90)),
    ]
}

fn items_table(items: &[Item]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(header(&["ID", "Date", "Type", "Amount", "Category", "Description"]));
    for item in items {
        table.add_row(vec![
            Cell::new(item.id),
            Cell::new(item.occurred_at.to_rfc3339()),
            Cell::new(item.kind),
            Cell::new(money(item.amount)),
            Cell::new(item.category.as_deref().unwrap_or("-")),
            Cell::new(item.description.as_deref().unwrap_or("-")),
        ]);
    }
    table
}

fn header(titles: &[&str]) -> Vec<Cell> {
    titles.iter().map(|title| Cell::new(title).fg(Color::Cyan)).collect()
}

fn money(value: Decimal) -> String {
    format!("{:.2}", value.round_dp(2))
}
