//! Startup and maintenance tool for the board store.
//!
//! Opening the store reconciles its schema before anything else touches it.
//!
//! Usage:
//!   kanban-db                          Open the store and seed the default board if empty
//!   kanban-db evolve                   Reconcile the schema and print what changed
//!   kanban-db boards                   List boards
//!   kanban-db metrics <board-id> [--as-of YYYY-MM-DD]
//!   kanban-db compact <column-id>      Renumber a column's cards one step apart

use std::env;

use anyhow::{Context, bail};
use db::{
    DBService, DbConfig, RetryConfig,
    models::{
        board::Board,
        card::Card,
        dashboard::Metrics,
    },
    validation::parse_date,
    with_retry,
};
use tracing::info;
use tracing_subscriber::EnvFilter;
use utils::assets::DATABASE_ENV;
use uuid::Uuid;

fn print_help() {
    println!("kanban-db: open, evolve and inspect the board store");
    println!();
    println!("Usage:");
    println!("  kanban-db                                  Seed the default board if the store is empty");
    println!("  kanban-db evolve                           Reconcile the schema and print the report");
    println!("  kanban-db boards                           List boards");
    println!("  kanban-db metrics <board-id> [--as-of D]   Dashboard counts for a board");
    println!("  kanban-db compact <column-id>              Renumber a column's cards");
    println!("  kanban-db --help                           Show this help");
    println!();
    println!("Environment:");
    println!("  {DATABASE_ENV}                     Storage location (path or sqlite:// URI)");
    println!("  KANBAN_SQLITE_MAX_CONNECTIONS Pool size, 1-100 (default 10)");
    println!("  RUST_LOG                      Log filter (default info)");
}

fn parse_id(arg: Option<&String>, what: &str) -> anyhow::Result<Uuid> {
    let raw = arg.with_context(|| format!("missing <{what}> argument"))?;
    Uuid::parse_str(raw).with_context(|| format!("invalid {what}: {raw}"))
}

async fn seed(db: &DBService) -> anyhow::Result<()> {
    let board = with_retry(&RetryConfig::default(), "ensure_default_board", || {
        Board::ensure_default(db)
    })
    .await?;
    let view = Board::load_view(&db.pool, board.id).await?;

    println!("{} ({})", view.board.name, view.board.id);
    for column in &view.columns {
        println!(
            "  {:<16} {} card(s)  [{}]",
            column.column.name,
            column.cards.len(),
            column.column.id
        );
    }
    Ok(())
}

async fn list_boards(db: &DBService) -> anyhow::Result<()> {
    let boards = Board::find_all(&db.pool).await?;
    if boards.is_empty() {
        println!("No boards yet.");
    }
    for board in boards {
        let state = if board.is_active { "" } else { " (inactive)" };
        println!("{}  {}{}", board.id, board.name, state);
    }
    Ok(())
}

async fn show_metrics(db: &DBService, args: &[String]) -> anyhow::Result<()> {
    let board_id = parse_id(args.get(2), "board-id")?;
    let today = match args.iter().position(|a| a == "--as-of") {
        Some(i) => {
            let raw = args.get(i + 1).context("--as-of needs a date")?;
            parse_date(raw)?.context("--as-of needs a date")?
        }
        None => chrono::Local::now().date_naive(),
    };

    let metrics = Metrics::compute_as_of(&db.pool, board_id, today).await?;
    println!("{}", serde_json::to_string_pretty(&metrics)?);
    Ok(())
}

async fn compact(db: &DBService, args: &[String]) -> anyhow::Result<()> {
    let column_id = parse_id(args.get(2), "column-id")?;
    let rewritten = with_retry(&RetryConfig::default(), "compact_column", || {
        Card::compact_column(db, column_id)
    })
    .await?;
    info!(%column_id, rewritten, "Compacted column");
    println!("{rewritten} card position(s) rewritten");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (for development)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let config = DbConfig::from_env();
    info!(path = %config.database_path.display(), "Opening board store");
    let db = DBService::open(&config)
        .await
        .context("store could not be opened; refusing to start")?;

    let result = match args.get(1).map(String::as_str) {
        None => seed(&db).await,
        Some("evolve") => {
            println!("{}", serde_json::to_string_pretty(&*db.evolution)?);
            Ok(())
        }
        Some("boards") => list_boards(&db).await,
        Some("metrics") => show_metrics(&db, &args).await,
        Some("compact") => compact(&db, &args).await,
        Some(other) => {
            print_help();
            db.close().await;
            bail!("unknown command: {other}");
        }
    };

    db.close().await;
    result
}
