use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    // Logging stays out of the way of normal CLI output unless RUST_LOG asks
    // for more.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("scrutin=warn")),
        )
        .with_target(false)
        .init();

    match scrutin::cli::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("scrutin: {err}");
            ExitCode::FAILURE
        }
    }
}
