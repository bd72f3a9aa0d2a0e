//! # facesort CLI
//!
//! ## Usage
//!
//! ```bash
//! facesort --config ./config/facesort.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `facesort init` | Create the SQLite database and schema |
//! | `facesort import <file>` | Load clustering output into the database |
//! | `facesort serve` | Start the HTTP server |
//! | `facesort persons` | List persons |
//! | `facesort person <id>` | Show a person with its faces |
//! | `facesort images [--without-faces]` | List images with face counts and owners |
//! | `facesort image <id>` | Show an image with its faces and owners |
//! | `facesort gallery` | Every person with all of its faces |
//! | `facesort rename <id> <name>` | Rename a person |
//! | `facesort move <face> --to <person>` | Move a face to an existing person |
//! | `facesort move <face> --new [--name N]` | Move a face to a new person |
//! | `facesort delete-face <face>` | Delete a face |
//! | `facesort delete-image <id>` | Delete an image and its faces |
//! | `facesort stats` | Gallery statistics |
//! | `facesort reset --yes` | Remove everything |
//!
//! `init`, `import` and `serve` work on the database directly. Every other
//! command talks to a running server at `[client].base_url` (or `--server`).

use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use facesort::{commands, config, import, migrate, server};

/// facesort: correct face clustering by moving, splitting and deleting faces.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/facesort.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "facesort", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/facesort.toml")]
    config: PathBuf,

    /// Server base URL, overriding `[client].base_url`.
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run more than once.
    Init,

    /// Import clustering output (JSON) into the database.
    Import {
        /// Path to the batch file.
        file: PathBuf,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// List persons, largest first.
    Persons {
        /// Only show persons whose name contains this text (case-insensitive).
        #[arg(long)]
        search: Option<String>,
    },

    /// Show one person with its faces and images.
    Person { id: String },

    /// List images with their face counts and owners.
    Images {
        /// Only show images in which no face was detected.
        #[arg(long)]
        without_faces: bool,
    },

    /// Show one image with its faces and their owners.
    Image { id: String },

    /// Show every person with all of its faces.
    Gallery,

    /// Rename a person.
    Rename { id: String, name: String },

    /// Move a face to another person.
    #[command(group(ArgGroup::new("destination").required(true).args(["to", "new"])))]
    Move {
        face_id: String,

        /// Person the face currently belongs to. The move is rejected if the
        /// face has been reassigned since.
        #[arg(long)]
        from: Option<String>,

        /// Target person: an id or an unambiguous part of a name.
        #[arg(long)]
        to: Option<String>,

        /// Move the face to a newly created person.
        #[arg(long)]
        new: bool,

        /// Name for the new person. A placeholder is generated if omitted.
        #[arg(long, requires = "new")]
        name: Option<String>,
    },

    /// Delete a face.
    DeleteFace {
        face_id: String,

        /// Person whose view to show afterwards.
        #[arg(long)]
        from: Option<String>,
    },

    /// Delete an image and all of its faces.
    DeleteImage { id: String },

    /// Show gallery statistics.
    Stats,

    /// Remove all persons, faces and images.
    Reset {
        /// Confirm the reset.
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,facesort=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match &cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
            return Ok(());
        }
        Commands::Import { file } => {
            import::run_import(&cfg, file).await?;
            return Ok(());
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
            return Ok(());
        }
        _ => {}
    }

    let client = commands::client_for(&cfg, cli.server.as_deref())?;
    match cli.command {
        Commands::Persons { search } => commands::run_persons(&client, search.as_deref()).await?,
        Commands::Person { id } => commands::run_person(&client, &id).await?,
        Commands::Images { without_faces } => {
            commands::run_images(&client, without_faces).await?
        }
        Commands::Image { id } => commands::run_image(&client, &id).await?,
        Commands::Gallery => commands::run_gallery(&client).await?,
        Commands::Rename { id, name } => commands::run_rename(&client, &id, &name).await?,
        Commands::Move {
            face_id,
            from,
            to,
            new: _,
            name,
        } => {
            commands::run_move(
                &client,
                &face_id,
                from.as_deref(),
                to.as_deref(),
                name.as_deref(),
            )
            .await?
        }
        Commands::DeleteFace { face_id, from } => {
            commands::run_delete_face(&client, &face_id, from.as_deref()).await?
        }
        Commands::DeleteImage { id } => commands::run_delete_image(&client, &id).await?,
        Commands::Stats => commands::run_stats(&client).await?,
        Commands::Reset { yes } => commands::run_reset(&client, yes).await?,
        Commands::Init | Commands::Import { .. } | Commands::Serve => {}
    }

    Ok(())
}
