mod clients;
mod config;
mod dates;
mod db;
mod enrich;
mod entry;
mod gateway;
mod models;
mod render;
mod rest;
mod routes;
mod tui;
mod view;

use anyhow::{anyhow, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use config::Config;
use dates::DatePreset;
use db::Database;
use enrich::{leaderboard, load_applications, ApplicationQuery};
use entry::NewApplication;
use gateway::{fetch, Gateway, Query, Row, Table};
use models::{Identity, Role, User};
use render::RowView;
use rest::RestGateway;
use routes::{Navigation, Route, Session};
use serde_json::json;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;
use view::{ApplicationsView, FilterState};

#[derive(Parser)]
#[command(name = "recruitops")]
#[command(about = "Recruiting operations dashboard - track client job applications by specialist")]
struct Cli {
    /// Use a local SQLite store instead of the hosted backend
    #[arg(long, global = true, env = "RECRUITOPS_LOCAL_DB")]
    local: Option<PathBuf>,

    /// Act as this user (overrides RECRUITOPS_USER_ID)
    #[arg(long, global = true)]
    user: Option<Uuid>,

    /// Log progress at info level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the local store schema
    InitLocal {
        /// Also create an admin user with this name and print its id
        #[arg(long)]
        admin: Option<String>,
    },

    /// Show who the configured user resolves to
    Whoami,

    /// List clients available to the current user
    Clients,

    /// List applications
    List {
        /// Date range (today, yesterday, wtd, last_week, mtd, last_month, last_7, last_30, qtd, ytd)
        #[arg(short, long)]
        range: Option<String>,

        /// Only this client
        #[arg(short, long)]
        client: Option<Uuid>,

        /// Only flagged applications
        #[arg(short, long)]
        flagged: bool,

        /// Filter loaded rows by company, title, client or location
        #[arg(short, long)]
        search: Option<String>,

        /// Show details for the application whose id starts with this
        #[arg(short, long)]
        expand: Option<String>,

        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show totals for a range
    Stats {
        #[arg(short, long)]
        range: Option<String>,

        #[arg(short, long)]
        client: Option<Uuid>,
    },

    /// Applications per specialist
    Leaderboard {
        #[arg(short, long)]
        range: Option<String>,
    },

    /// Browse applications in TUI
    Browse {
        #[arg(short, long)]
        range: Option<String>,
    },

    /// Resolve a dashboard path and show its terminal view
    Open {
        /// e.g. /applications, /admin/entry
        #[arg(default_value = "/")]
        path: String,
    },

    /// Log an application (admin only)
    Add {
        company: String,
        job_title: String,

        #[arg(long)]
        client: Option<Uuid>,

        #[arg(long)]
        specialist: Option<Uuid>,

        /// YYYY-MM-DD, defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,

        #[arg(long)]
        source: Option<String>,

        #[arg(long)]
        source_link: Option<String>,

        #[arg(long)]
        application_link: Option<String>,

        #[arg(long)]
        location: Option<String>,

        #[arg(long)]
        salary: Option<String>,

        #[arg(long)]
        resume: Option<String>,
    },

    /// Soft-delete an application (admin only)
    Delete { id: Uuid },

    /// Flag an application for review (admin only)
    Flag {
        id: Uuid,

        /// Why it was flagged
        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Clear a flag (admin only)
    Unflag { id: Uuid },
}

fn init_tracing(verbose: bool, log_file: Option<PathBuf>) -> Result<()> {
    let default = if verbose { "recruitops=info" } else { "recruitops=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into());

    match log_file {
        // The TUI owns the terminal; logs go to a file instead.
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
    Ok(())
}

fn log_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "recruitops")
        .map(|dirs| dirs.data_dir().join("recruitops.log"))
        .unwrap_or_else(|| PathBuf::from("recruitops.log"))
}

fn open_gateway(cli_local: Option<PathBuf>, config: &Config) -> Result<Arc<dyn Gateway>> {
    match cli_local.or_else(|| config.local_db.clone()) {
        Some(path) => {
            let db = Database::open_at(&path)?;
            db.ensure_initialized()?;
            info!(path = %path.display(), "using local store");
            Ok(Arc::new(db))
        }
        None => {
            let gateway = RestGateway::new(&config.backend)?;
            info!(backend = %gateway.describe(), "using hosted backend");
            Ok(Arc::new(gateway))
        }
    }
}

fn resolve_identity(gateway: &dyn Gateway, user_id: Uuid) -> Result<Identity> {
    let query = Query::from(Table::Users)
        .select(&["id", "name", "role", "is_demo"])
        .eq("id", user_id);
    let user: User = fetch(gateway, &query)
        .context("Failed to load user profile")?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("No user {} in {}", user_id, gateway.describe()))?;
    Ok(Identity::from(user))
}

fn parse_range(range: Option<&str>, config: &Config) -> Result<DatePreset> {
    Ok(range.unwrap_or(config.range_name()).parse::<DatePreset>()?)
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let log_file = matches!(cli.command, Commands::Browse { .. } | Commands::Open { .. }).then(log_path);
    init_tracing(cli.verbose, log_file)?;

    let mut config = Config::load()?;
    if let Some(user) = cli.user {
        config.user_id = Some(user);
    }

    if let Commands::InitLocal { admin } = &cli.command {
        return init_local(cli.local.clone().or_else(|| config.local_db.clone()), admin.as_deref());
    }

    if let Commands::Open { path } = &cli.command {
        if open_without_session(path, &config) {
            return Ok(());
        }
    }

    let gateway = open_gateway(cli.local.clone(), &config)?;
    let identity = resolve_identity(gateway.as_ref(), config.require_user()?)?;

    match cli.command {
        // Runs before any backend is opened.
        Commands::InitLocal { .. } => {}

        Commands::Whoami => {
            println!("{} ({})", identity.name, identity.role.as_str());
            println!("User ID: {}", identity.user_id);
            println!("Backend: {}", gateway.describe());
        }

        Commands::Clients => {
            let clients = clients::load_clients(gateway.as_ref(), &identity)?;
            if clients.is_empty() {
                println!("No clients found.");
            } else {
                println!("{:<38} {:<30}", "ID", "NAME");
                println!("{}", "-".repeat(68));
                for client in clients {
                    println!("{:<38} {:<30}", client.id, truncate(&client.display_name(), 30));
                }
            }
        }

        Commands::List { range, client, flagged, search, expand, json } => {
            let filters = FilterState {
                client_id: client,
                range: parse_range(range.as_deref(), &config)?,
                search: search.unwrap_or_default(),
                flagged_only: flagged,
            };
            let mut view = ApplicationsView::new(identity, filters);
            view.refresh(gateway.as_ref());
            if let Some(err) = view.last_error() {
                return Err(anyhow!("{}", err));
            }
            if let Some(err) = view.clients_error() {
                eprintln!("Warning: {}", err);
            }

            if let Some(prefix) = expand {
                let id = view
                    .visible()
                    .iter()
                    .map(|r| r.application.id)
                    .find(|id| id.to_string().starts_with(&prefix))
                    .ok_or_else(|| anyhow!("No listed application with id {}", prefix))?;
                view.toggle_expanded(id);
            }

            let visible = view.visible();
            if json {
                println!("{}", serde_json::to_string_pretty(&visible)?);
            } else if visible.is_empty() {
                println!("No applications found.");
            } else {
                let stats = view.stats();
                println!(
                    "{} - Total: {}  Flagged: {}  Today: {}",
                    view.filters().range.label(),
                    stats.total,
                    stats.flagged,
                    stats.today
                );
                println!("{}", "-".repeat(72));
                for record in visible {
                    let row = RowView::build(record, view.is_expanded(record.application.id));
                    let short_id = record.application.id.to_string();
                    for (i, line) in row.lines().iter().enumerate() {
                        let label = if i == 0 { &short_id[..8] } else { "" };
                        println!("{:<9} {}", label, line);
                    }
                }
            }
        }

        Commands::Stats { range, client } => {
            let preset = parse_range(range.as_deref(), &config)?;
            let params = ApplicationQuery::scoped(&identity, preset.resolve(today()), client, false);
            let loaded = load_applications(gateway.as_ref(), &params, today())?;
            println!("Range:   {} ({} to {})", preset.label(), params.range.start, params.range.end);
            println!("Total:   {}", loaded.stats.total);
            println!("Flagged: {}", loaded.stats.flagged);
            println!("Today:   {}", loaded.stats.today);
        }

        Commands::Leaderboard { range } => {
            let preset = parse_range(range.as_deref(), &config)?;
            print_leaderboard(gateway.as_ref(), preset)?;
        }

        Commands::Browse { range } => {
            let filters = FilterState {
                range: parse_range(range.as_deref(), &config)?,
                ..Default::default()
            };
            tui::run_browse(ApplicationsView::new(identity, filters), gateway)?;
        }

        Commands::Open { path } => {
            let (resolved, nav) = routes::follow(&path, Session::SignedIn(&identity));
            info!(from = %path, to = %resolved, "route resolved");
            match nav {
                Navigation::Render(Route::Applications | Route::AdminApplications) => {
                    let filters = FilterState {
                        range: parse_range(None, &config)?,
                        ..Default::default()
                    };
                    tui::run_browse(ApplicationsView::new(identity, filters), gateway)?;
                }
                Navigation::Render(Route::Leaderboard) => {
                    print_leaderboard(gateway.as_ref(), parse_range(None, &config)?)?;
                }
                Navigation::Render(route) => {
                    println!("{} resolves to {:?}, which has no terminal view yet.", path, route);
                }
                Navigation::Redirect(to) => println!("{} keeps redirecting (last: {}).", path, to),
                Navigation::Loading => println!("Session still loading."),
            }
        }

        Commands::Add {
            company,
            job_title,
            client,
            specialist,
            date,
            source,
            source_link,
            application_link,
            location,
            salary,
            resume,
        } => {
            let new = NewApplication {
                company,
                job_title,
                client_id: client,
                specialist_id: specialist,
                date_applied: date,
                source,
                source_link,
                application_link,
                location,
                salary,
                resume_used: resume,
                ..Default::default()
            };
            let app = entry::add_application(gateway.as_ref(), &identity, new, today())?;
            println!("Added application {} ({} - {})", app.id, app.company, app.job_title);
        }

        Commands::Delete { id } => {
            entry::soft_delete(gateway.as_ref(), &identity, id)?;
            println!("Deleted application {}.", id);
        }

        Commands::Flag { id, reason } => {
            entry::set_flag(gateway.as_ref(), &identity, id, reason.as_deref())?;
            println!("Flagged application {}.", id);
        }

        Commands::Unflag { id } => {
            entry::clear_flag(gateway.as_ref(), &identity, id)?;
            println!("Cleared flag on application {}.", id);
        }
    }

    Ok(())
}

/// Handles `open` for paths that are decided before a user is known.
/// Returns false when the path needs a signed-in session.
fn open_without_session(path: &str, config: &Config) -> bool {
    let (_, pending) = routes::follow(path, Session::Loading);
    let signed_out = config.user_id.is_none();
    if !signed_out && pending == Navigation::Loading {
        return false;
    }

    let (resolved, _) = routes::follow(path, Session::SignedOut);
    if path.trim_end_matches('/') != resolved {
        println!("{} redirects to {}.", path, resolved);
    }
    println!("Sign in by passing --user <uuid> or setting RECRUITOPS_USER_ID.");
    true
}

fn init_local(path: Option<PathBuf>, admin: Option<&str>) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => Database::default_path()?,
    };
    let db = Database::open_at(&path)?;
    db.init()?;
    println!("Local store initialized at {}", db.path().display());

    if let Some(name) = admin {
        let mut row = Row::new();
        row.insert("name".to_string(), json!(name));
        row.insert("role".to_string(), json!(Role::Admin.as_str()));
        let stored = db.insert(Table::Users, &row)?;
        let id = stored.get("id").and_then(|v| v.as_str()).unwrap_or_default();
        println!("Created admin '{}' with id {}", name, id);
        println!("Use it with --user {} or RECRUITOPS_USER_ID", id);
    }
    Ok(())
}

fn print_leaderboard(gateway: &dyn Gateway, preset: DatePreset) -> Result<()> {
    // Everyone sees the whole team here, not just their own rows.
    let params = ApplicationQuery {
        range: preset.resolve(today()),
        client_id: None,
        specialist_id: None,
        flagged_only: false,
    };
    let loaded = load_applications(gateway, &params, today())?;
    let entries = leaderboard(&loaded.records);
    if entries.is_empty() {
        println!("No applications found.");
        return Ok(());
    }

    println!("{} leaderboard", preset.label());
    println!("{:<5} {:<30} {:>6} {:>8}", "RANK", "SPECIALIST", "APPS", "FLAGGED");
    println!("{}", "-".repeat(52));
    for (i, entry) in entries.iter().enumerate() {
        println!(
            "{:<5} {:<30} {:>6} {:>8}",
            i + 1,
            truncate(&entry.specialist_name, 28),
            entry.applications,
            entry.flagged
        );
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
