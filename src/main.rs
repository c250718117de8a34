mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;
use warden::server::auth::AuthConfig;
use warden::{Client, ClientConfig, Error as WardenError, Manager, ServiceState};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        if let Some(err) = e.downcast_ref::<WardenError>() {
            eprintln!("Error: {}", err.with_suggestion());
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let is_ui = matches!(cli.command, Commands::Ui);
    init_tracing(is_ui)?;

    match cli.command {
        Commands::Serve {
            addr,
            dir,
            name,
            enable_all,
            passfile,
            genpass,
        } => serve(&addr, &dir, &name, enable_all, passfile, genpass).await,
        ref command => {
            let client = Client::connect(ClientConfig {
                addr: cli.addr.clone(),
                user: cli.user.clone(),
                pass: cli.pass.clone(),
                cacert: cli.cacert.clone(),
                capath: cli.capath.clone(),
                insecure: cli.insecure,
            })?;
            match command {
                Commands::Services => {
                    let (names, _) = client.services().await?;
                    for name in names {
                        println!("{}", name);
                    }
                    Ok(())
                }
                Commands::Status { names } => show_status(&client, names).await,
                Commands::Info { name } => show_info(&client, name).await,
                Commands::Enable { name } => Ok(client.enable(name).await?),
                Commands::Disable { name } => Ok(client.disable(name).await?),
                Commands::Restart { name } => Ok(client.restart(name).await?),
                Commands::Clear { name } => Ok(client.clear(name).await?),
                Commands::Log { name } => show_log(&client, name.as_deref()).await,
                Commands::Ui => Ok(warden::tui::run(client).await?),
                Commands::Serve { .. } => unreachable!(),
            }
        }
    }
}

async fn serve(
    addr: &str,
    dir: &Path,
    name: &str,
    enable_all: bool,
    passfile: Option<std::path::PathBuf>,
    genpass: Option<String>,
) -> anyhow::Result<()> {
    let manager = Manager::new(name);
    manager.start_monitoring().await;

    let svc_dir = dir.join("services");
    let services = warden::load_manifest_dir(&svc_dir).map_err(|e| {
        anyhow::anyhow!("failed to scan services directory {}: {}", svc_dir.display(), e)
    })?;
    if services.is_empty() {
        tracing::warn!("no service manifests found in {}", svc_dir.display());
    }
    for svc in services {
        let handle = manager.add_service(svc).await;
        if enable_all {
            if let Err(e) = handle.enable().await {
                tracing::warn!("failed to enable {}: {}", handle.name(), e);
            }
        }
    }

    let mut auth: Option<AuthConfig> = None;
    if let Some(spec) = genpass {
        let (user, pass) = spec
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("--genpass expects USER:PASS"))?;
        let mut cfg = auth.take().unwrap_or_else(|| AuthConfig::new(name));
        let hash = cfg.add_password(user, pass)?;
        println!("Encrypted password is {}", hash);
        auth = Some(cfg);
    }
    if let Some(path) = passfile {
        let mut cfg = auth.take().unwrap_or_else(|| AuthConfig::new(name));
        cfg.load_passwd_file(&path)?;
        auth = Some(cfg);
    }

    let app = warden::server::router(manager.clone());
    let app = match auth {
        Some(cfg) => app.layer(axum::middleware::from_fn_with_state(
            std::sync::Arc::new(cfg),
            warden::server::auth::require_auth,
        )),
        None => app,
    };

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutting down");
    manager.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

async fn show_status(client: &Client, names: &[String]) -> anyhow::Result<()> {
    let selected: Vec<String> = if names.is_empty() {
        client.services().await?.0
    } else {
        names.to_vec()
    };
    for name in selected {
        let (info, _) = client.service(&name).await?;
        println!(
            "{:<20} {:<8} {:<30} {}",
            info.name,
            info.state().to_string(),
            info.status,
            info.tstamp.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

async fn show_info(client: &Client, name: &str) -> anyhow::Result<()> {
    let (info, _) = client.service(name).await?;
    println!("Name:        {}", info.name);
    println!("Description: {}", info.description);
    println!("State:       {}", info.state());
    println!("Status:      {}", info.status);
    println!(
        "Since:       {}",
        info.tstamp.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S")
    );
    if !info.provides.is_empty() {
        println!("Provides:    {}", info.provides.join(", "));
    }
    if !info.depends.is_empty() {
        println!("Depends:     {}", info.depends.join(", "));
    }
    if !info.conflicts.is_empty() {
        println!("Conflicts:   {}", info.conflicts.join(", "));
    }
    if info.state() == ServiceState::Failed {
        println!("Failed:      yes");
    }
    Ok(())
}

async fn show_log(client: &Client, name: Option<&str>) -> anyhow::Result<()> {
    let records = match name {
        Some(name) => client.service_log(name).await?,
        None => client.global_log().await?,
    };
    for rec in records {
        println!(
            "{} {}",
            rec.time.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S"),
            rec.text
        );
    }
    Ok(())
}

fn init_tracing(is_ui: bool) -> anyhow::Result<()> {
    if is_ui {
        // The terminal belongs to the UI; divert diagnostics to a file.
        let log_dir = warden::base_dir().join("warden").join("logs");
        std::fs::create_dir_all(&log_dir)?;
        let log_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_dir.join("ui.log"))?;
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_writer(std::sync::Mutex::new(log_file))
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}
