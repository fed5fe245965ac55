use anyhow::Result;
use log::LevelFilter;
use std::fs::OpenOptions;

// Utility helpers for the binary: logging setup and stdin prompts.

/// Read a line of input from stdin, trimming whitespace
pub fn read_line() -> Result<String> {
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

/// Initialise logging. When a file path is given the log goes there so
/// the interactive terminal stays clean; otherwise stderr.
pub fn setup_logging(log_file: Option<&str>, level: LevelFilter) -> Result<()> {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);

    if let Some(path) = log_file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.try_init()?;

    log::info!("Logging initialized at level: {}", level);
    log::info!(
        "App version: {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("CARGO_PKG_NAME")
    );

    Ok(())
}
