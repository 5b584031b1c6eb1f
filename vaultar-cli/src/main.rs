mod application;
mod presentation;
mod ui;

use vaultar_core::Result;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(version = vaultar_core::VERSION, "vaultar starting");

    if let Err(err) = application::run() {
        eprintln!("vaultar: {err}");
        std::process::exit(1);
    }
    Ok(())
}
