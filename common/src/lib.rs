use std::path::Path;
use std::process::ExitCode;
use std::time::Instant;

use tracing_subscriber::EnvFilter;

mod find_schema;
pub use find_schema::*;

/// Main execution wrapper
pub fn run<T, E: std::fmt::Debug, F: FnOnce() -> Result<T, E>>(f: F) -> ExitCode {
    let start_time = Instant::now();
    if let Err(e) = f() {
        eprintln!("\nError: {:?}", e);
        return ExitCode::FAILURE;
    }
    let elapsed = start_time.elapsed();
    tracing::info!("finished in {:.02} seconds", elapsed.as_secs_f32());
    ExitCode::SUCCESS
}

/// Log to stderr, filtered by `RUST_LOG` (`info` if not set)
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub fn ensure_parent_exists(path: impl AsRef<Path>) -> std::io::Result<()> {
    if let Some(parent) = path.as_ref().parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
