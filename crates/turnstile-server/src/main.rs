use std::process::ExitCode;

use turnstile_server::ServerBuilder;
use turnstile_server::config::loader::{self, load_config};
use turnstile_server::observability;

#[tokio::main]
async fn main() -> ExitCode {
    match dotenvy::dotenv() {
        Err(e) if !e.not_found() => eprintln!("Ignoring unreadable .env: {e}"),
        _ => {}
    }

    observability::init_logging("info");

    let path = config_path(std::env::args().skip(1), std::env::var("TURNSTILE_CONFIG").ok());
    let cfg = match load_config(Some(&path)) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(path = %path, error = %e, "Invalid configuration");
            return ExitCode::from(2);
        }
    };
    tracing::info!(path = %path, "Configuration loaded");
    observability::set_level(&cfg.logging.level);

    let server = match ServerBuilder::new().with_config(cfg).build().await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "Server failed to start");
            return ExitCode::from(2);
        }
    };

    match server.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Server stopped with an error");
            ExitCode::FAILURE
        }
    }
}

/// `--config <path>` or `--config=<path>`, then `TURNSTILE_CONFIG`, then
/// the default file name.
fn config_path(mut args: impl Iterator<Item = String>, from_env: Option<String>) -> String {
    while let Some(arg) = args.next() {
        if let Some(path) = arg.strip_prefix("--config=") {
            return path.to_string();
        }
        if arg == "--config"
            && let Some(path) = args.next()
        {
            return path;
        }
    }
    from_env
        .filter(|path| !path.is_empty())
        .unwrap_or_else(|| loader::DEFAULT_PATH.to_string())
}
