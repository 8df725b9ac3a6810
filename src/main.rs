use anyhow::Result;
use clap::{Parser, Subcommand};
use novelgraph::analysis;
use novelgraph::db::{migrate, Db};
use novelgraph::extraction::OpenAiExtractor;
use novelgraph::{Config, GraphEngine, GraphRequest};
use std::path::Path;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "novelgraph")]
#[command(about = "Incremental character relationship graphs for long-form fiction")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Verify database schema and applied migrations
    Verify,
    /// Analyze the character roster of a novel
    Characters {
        novel_id: i64,
        /// Re-extract even when a roster already exists
        #[arg(short, long)]
        force: bool,
    },
    /// Show one character with its relations in both directions
    Character { character_id: i64 },
    /// Compute (or fetch) the relationship graph of a novel
    Graph {
        novel_id: i64,
        /// Center the graph on this character (ego network)
        #[arg(short, long)]
        center: Option<i64>,
        /// Neighborhood depth around the center
        #[arg(short, long)]
        depth: Option<usize>,
        /// Discard stored relations and recompute from source text
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "info")).init();

    let args = Args::parse();
    let config = Config::load()?;

    let db = Db::new(config.db_path());
    let migrations_dir = Path::new("migrations");
    db.with_connection(move |conn| migrate::run_migrations(conn, migrations_dir))
        .await?;

    match args.command {
        Command::Verify => {
            verify_schema(&db).await?;
        }
        Command::Characters { novel_id, force } => {
            let extractor = OpenAiExtractor::from_config(&config.extraction)?;
            let roster = analysis::analyze_characters(&db, &extractor, novel_id, force).await?;
            println!("{}", serde_json::to_string_pretty(&roster)?);
        }
        Command::Character { character_id } => {
            let detail = analysis::character_detail(&db, character_id).await?;
            println!("{}", serde_json::to_string_pretty(&detail)?);
        }
        Command::Graph {
            novel_id,
            center,
            depth,
            force,
        } => {
            let extractor = Arc::new(OpenAiExtractor::from_config(&config.extraction)?);
            let engine = GraphEngine::new(db, extractor);
            let graph = engine
                .relationship_graph(GraphRequest {
                    novel_id,
                    character_id: center,
                    depth: depth.unwrap_or(config.graph.default_depth),
                    force_refresh: force,
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&graph)?);
        }
    }

    Ok(())
}

/// Check that all expected database objects exist
async fn verify_schema(db: &Db) -> Result<()> {
    use novelgraph::NovelGraphError;

    db.with_connection(|conn| {
        let mut stmt =
            conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

        let expected = [
            "novels",
            "chapters",
            "characters",
            "relationships",
            "relationship_graphs",
            "relationship_edges",
            "schema_migrations",
        ];
        for table in expected {
            if !tables.iter().any(|t| t == table) {
                return Err(NovelGraphError::Config(format!("Missing table: {}", table)));
            }
            log::debug!("Table exists: {}", table);
        }

        let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        if journal_mode.to_uppercase() != "WAL" {
            return Err(NovelGraphError::Config(format!(
                "Journal mode is not WAL: {}",
                journal_mode
            )));
        }

        let foreign_keys: i32 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
        if foreign_keys != 1 {
            return Err(NovelGraphError::Config(
                "Foreign keys not enabled".to_string(),
            ));
        }

        let applied = migrate::get_applied_migrations(conn)?;
        log::info!("{} migrations applied", applied.len());

        let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if integrity != "ok" {
            return Err(NovelGraphError::Config(format!(
                "Database integrity check failed: {}",
                integrity
            )));
        }

        Ok(())
    })
    .await?;

    log::info!("Database schema verification complete");
    Ok(())
}
