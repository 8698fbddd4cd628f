use std::path::PathBuf;

use clap::{Parser, Subcommand};
use wpgraft::commands::migrate::Pass;
use wpgraft::output::Format;

#[derive(Parser)]
#[command(
    name = "wpgraft",
    version,
    about = "Idempotent migration of a WordPress export into a target page tree"
)]
struct Cli {
    /// Migration config file
    #[arg(long, global = true, default_value = "wpgraft.yaml")]
    config: PathBuf,
    /// Output format
    #[arg(long, global = true, value_enum, default_value = "json")]
    format: Format,
    /// Shorthand for --format pretty
    #[arg(long, global = true, hide = true)]
    pretty: bool,
    /// Write the full batch report as JSON to this path
    #[arg(long, global = true)]
    report: Option<PathBuf>,
    /// Emit log records as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter config and create the target store
    Init {
        /// Path of the legacy WordPress export (SQLite)
        #[arg(long, default_value = "legacy.db")]
        legacy_db: PathBuf,
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },
    /// Show record counts in the target store
    Status,
    /// List navigation menus in the legacy dataset
    Menus,
    /// Import legacy attachments as files
    Attachments,
    /// Import legacy pages
    Pages,
    /// Reparent pages to match the legacy hierarchy
    Hierarchy,
    /// Rewrite legacy links and asset URLs inside page bodies
    ContentUrls,
    /// Promote the legacy front page to the home page
    Homepage,
    /// Make the page tree follow a legacy navigation menu
    Menu {
        /// Menu slug (defaults to navigation_menu from the config)
        #[arg(long)]
        slug: Option<String>,
    },
    /// Import calendar events
    Events,
    /// Import Gravity Forms as form pages
    Forms,
    /// Run every pass in order
    All,
}

fn run(cli: Cli, format: Format) -> wpgraft::error::Result<()> {
    let config = cli.config.as_path();
    let report = cli.report.as_deref();
    let pass = match cli.command {
        Commands::Init { legacy_db, force } => {
            return wpgraft::commands::init::run(config, &legacy_db, force);
        }
        Commands::Status => return wpgraft::commands::status::run(config, format),
        Commands::Menus => return wpgraft::commands::menus::run(config, format),
        Commands::Menu { slug } => {
            return wpgraft::commands::migrate::run(config, Pass::Menu, slug.as_deref(), report, format);
        }
        Commands::Attachments => Pass::Attachments,
        Commands::Pages => Pass::Pages,
        Commands::Hierarchy => Pass::Hierarchy,
        Commands::ContentUrls => Pass::ContentUrls,
        Commands::Homepage => Pass::Homepage,
        Commands::Events => Pass::Events,
        Commands::Forms => Pass::Forms,
        Commands::All => Pass::All,
    };
    wpgraft::commands::migrate::run(config, pass, None, report, format)
}

fn main() {
    let cli = Cli::parse();
    let format = if cli.pretty {
        Format::Pretty
    } else {
        cli.format
    };
    wpgraft::logging::init(cli.log_json);
    if let Err(e) = run(cli, format) {
        match format {
            Format::Json => {
                eprintln!(
                    "{}",
                    serde_json::json!({
                        "error": e.code(),
                        "message": e.to_string()
                    })
                );
            }
            _ => eprintln!("error: {e}"),
        }
        std::process::exit(1);
    }
}
