use famscore_server::{server, storage};
mod cli;

use std::io::Read;
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    use clap::Parser;
    let args = cli::Cli::parse();

    // Console-only logging with env-driven level
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_ansi(true)
        .init();

    if let Some(cmd) = args.command {
        match cmd {
            cli::Command::HashPassword => {
                hash_password();
                return;
            }
            cli::Command::RemoveFamily { family_id, yes } => {
                remove_family(&family_id, yes).await;
                return;
            }
        }
    }

    let config = match server::AppConfig::load() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error=%e, "Failed to load config");
            std::process::exit(2);
        }
    };
    let tz = match config.tz() {
        Ok(tz) => tz,
        Err(e) => {
            tracing::error!(error=%e, "Invalid timezone in config");
            std::process::exit(2);
        }
    };

    let store = connect_store(tz).await;

    // Seed family and member rows from config
    if let Err(e) = store
        .seed_from_config(&config.family.id, &config.family.name, config.member_seeds())
        .await
    {
        tracing::error!(error=%e, "Failed to seed DB");
        std::process::exit(4);
    }

    // Decide listen port: env PORT overrides config.listen_port, default 5252
    let port = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .or(config.listen_port)
        .unwrap_or(5252);

    let state = server::AppState::new(config, store);
    let shutdown_token = state.shutdown_token();
    let shutdown_token_for_server = shutdown_token.clone();

    let app = server::router(state);

    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("bind listener");

    // Graceful shutdown on SIGINT/SIGTERM with a fallback timeout
    let mut server_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_token_for_server.cancelled_owned())
            .await
    });

    shutdown_signal().await;
    tracing::info!("shutdown: initiating graceful stop");
    shutdown_token.cancel();
    match tokio::time::timeout(std::time::Duration::from_secs(3), &mut server_task).await {
        Ok(join_res) => match join_res {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::error!(%err, "server error"),
            Err(e) => tracing::error!(error=%e, "server task join error"),
        },
        Err(_) => {
            tracing::warn!("shutdown: forcing server abort due to timeout");
            server_task.abort();
        }
    }
}

async fn connect_store(tz: chrono_tz::Tz) -> storage::Store {
    let db_path = std::env::var("DB_PATH").unwrap_or_else(|_| "data/famscore.db".into());
    // Ensure data dir exists when using the default
    if let Some(parent) = std::path::Path::new(&db_path).parent()
        && !parent.as_os_str().is_empty()
    {
        let _ = std::fs::create_dir_all(parent);
    }
    match storage::Store::connect_sqlite(&db_path, tz).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error=%e, path=%db_path, "Failed to connect DB");
            std::process::exit(3);
        }
    }
}

fn hash_password() {
    let mut input = String::new();
    if std::io::stdin().read_to_string(&mut input).is_err() {
        eprintln!("failed to read password from stdin");
        std::process::exit(2);
    }
    let password = input.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        eprintln!("empty password");
        std::process::exit(2);
    }
    match bcrypt::hash(password, bcrypt::DEFAULT_COST) {
        Ok(h) => println!("{h}"),
        Err(e) => {
            eprintln!("hash error: {e}");
            std::process::exit(2);
        }
    }
}

async fn remove_family(family_id: &str, yes: bool) {
    if !yes {
        eprintln!("refusing to remove family '{family_id}' without --yes");
        std::process::exit(2);
    }
    let store = connect_store(chrono_tz::UTC).await;
    match store.remove_family(family_id).await {
        Ok(true) => tracing::info!(family_id, "family removed"),
        Ok(false) => {
            eprintln!("family not found: {family_id}");
            std::process::exit(1);
        }
        Err(e) => {
            tracing::error!(error=%e, family_id, "failed to remove family");
            std::process::exit(3);
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigint = signal(SignalKind::interrupt()).expect("listen SIGINT");
        let mut sigterm = signal(SignalKind::terminate()).expect("listen SIGTERM");
        tokio::select! {
            _ = sigint.recv() => {
                tracing::info!("shutdown: received SIGINT");
            }
            _ = sigterm.recv() => {
                tracing::info!("shutdown: received SIGTERM");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown: received Ctrl+C");
    }
}
