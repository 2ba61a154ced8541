use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "relgraph", version, about = "GraphQL over relational metadata")]
struct Cli {
    /// Configuration file (YAML). Defaults apply when omitted.
    #[arg(long, short, env = "RELGRAPH_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Database URL, overriding the configured upstream.
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// Database schema to expose, overriding the configuration.
    #[arg(long, global = true)]
    db_schema: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the metadata snapshot (tables, fields, annotations) as JSON.
    Tables,

    /// Build the schema and print its SDL.
    Sdl {
        /// Write to this file instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Build the schema and execute one GraphQL query.
    Query {
        /// Query text, or `@path` to read it from a file.
        query: String,

        /// Variables as a JSON object.
        #[arg(long)]
        variables: Option<String>,
    },

    /// Fetch the content behind a blob link id.
    Blob {
        /// The `id` parameter of a blob link.
        id: String,

        /// Write to this file instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let overrides = commands::Overrides {
        config: cli.config,
        database_url: cli.database_url,
        db_schema: cli.db_schema,
    };

    match cli.cmd {
        Command::Tables => commands::tables::run(&overrides).await,
        Command::Sdl { out } => commands::sdl::run(&overrides, out).await,
        Command::Query { query, variables } => {
            commands::query::run(&overrides, query, variables).await
        }
        Command::Blob { id, out } => commands::blob::run(&overrides, id, out).await,
    }
}
