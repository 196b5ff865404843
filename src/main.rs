use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use canopy::api::{self, middleware::SecurityConfig, AppState};
use canopy::db::Database;
use canopy::dispatch::export_subtree;
use canopy::registry::FeatureRegistry;
use canopy::router::split_path;
use canopy::tree::{render_tree, AncestryResolver};

#[derive(Parser)]
#[command(name = "canopy")]
#[command(about = "Hierarchical content router")]
struct Cli {
    /// SQLite database file (defaults to CANOPY_DATABASE, then the platform data directory)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port for HTTP API
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
    /// Print the content tree
    Tree,
    /// Print a subtree (or everything) as JSON
    Export {
        /// Slash-separated directory path
        path: Option<String>,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "canopy=debug,tower_http=debug".into()),
    );

    // Logs go to stderr so tree and export output stay clean on stdout
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn open_database(path: Option<PathBuf>) -> anyhow::Result<Database> {
    let path = path.or_else(|| std::env::var_os("CANOPY_DATABASE").map(PathBuf::from));
    let db = match path {
        Some(path) => Database::open(path)?,
        None => Database::open_default()?,
    };
    db.migrate()?;
    Ok(db)
}

async fn serve(db: Database, port: u16) -> anyhow::Result<()> {
    tracing::info!("Starting Canopy server on port {}", port);

    let registry = FeatureRegistry::with_builtin_features();
    let scopes: Vec<String> = registry.features().into_iter().map(|e| e.scope).collect();
    tracing::info!("Registered feature scopes: {}", scopes.join(", "));

    let config = SecurityConfig::from_env();
    if config.api_key.is_some() {
        tracing::info!("API key authentication enabled");
    }

    let app = api::create_router_with_config(AppState::new(db, registry), config);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!("Canopy server listening on http://127.0.0.1:{}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

fn export(db: &Database, path: Option<String>) -> anyhow::Result<canopy::models::DirectoryExport> {
    let segments = path.as_deref().map(split_path).unwrap_or_default();
    let directory = if segments.is_empty() {
        None
    } else {
        AncestryResolver::new(db).resolve(&segments)?.pop()
    };
    export_subtree(db, directory)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let db = open_database(cli.database)?;

    match cli.command.unwrap_or(Commands::Serve { port: 3000 }) {
        Commands::Serve { port } => serve(db, port).await?,
        Commands::Tree => {
            let export = export_subtree(&db, None)?;
            if export.record_count() == 0 {
                println!("(empty)");
            } else {
                print!("{}", render_tree(&export));
            }
        }
        Commands::Export { path } => {
            let export = export(&db, path)?;
            println!("{}", serde_json::to_string_pretty(&export)?);
        }
    }

    Ok(())
}
