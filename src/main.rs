//! Task desk: task-management REST service.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::Path;
use taskdesk::api::{self, AppState};
use taskdesk::cli::{Cli, Command, CreateUserArgs, ServeArgs, seed};
use taskdesk::config::Config;
use taskdesk::db::Database;
use taskdesk::lifecycle::TaskLifecycle;
use taskdesk::logging::{self, LogTarget};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(&LogTarget::parse(&cli.log), cli.verbose)?;

    let mut config = Config::resolve(cli.config.as_deref().map(Path::new))?;
    if let Some(db_path) = &cli.database {
        config.server.db_path = db_path.into();
    }

    match cli.command {
        None => serve(config, ServeArgs::default()).await,
        Some(Command::Serve(args)) => serve(config, args).await,
        Some(Command::CreateUser(args)) => create_user(&config, args),
        Some(Command::Seed) => {
            let db = open_database(&config)?;
            let report = seed::run(&db)?;
            if report.users == 0 {
                println!("Seed data already present, nothing written.");
            } else {
                println!(
                    "Seeded {} users, {} tags and {} tasks. Log in as {} / {}.",
                    report.users,
                    report.tags,
                    report.tasks,
                    seed::ADMIN_EMAIL,
                    seed::SEED_PASSWORD
                );
            }
            Ok(())
        }
    }
}

fn open_database(config: &Config) -> Result<Database> {
    config.ensure_db_dir()?;
    let db = Database::open(&config.server.db_path)
        .with_context(|| format!("opening database {}", config.server.db_path.display()))?;
    info!("Database: {:?}", config.server.db_path);
    Ok(db)
}

fn create_user(config: &Config, args: CreateUserArgs) -> Result<()> {
    let db = open_database(config)?;
    let user = db.create_user(&args.name, &args.email, &args.password, args.role.into())?;
    println!("Created {} user {} (id {})", user.role.as_str(), user.email, user.id);
    Ok(())
}

async fn serve(mut config: Config, args: ServeArgs) -> Result<()> {
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let db = open_database(&config)?;
    let lifecycle = TaskLifecycle::new(db).with_page_limits(config.pagination.limits());
    let state = AppState::new(lifecycle, config.auth.token_ttl_seconds);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.server.host, config.server.port))?;
    let (shutdown_tx, _bound, handle) = api::start_server(state, addr).await?;

    tokio::signal::ctrl_c().await?;
    info!("Received interrupt");
    let _ = shutdown_tx.send(());
    handle.await?;
    Ok(())
}
