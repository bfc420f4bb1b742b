//! authgate - terminal front end for a bearer-token authenticated backend.
//!
//! One-shot commands operate on the durable token only, since the
//! ephemeral tier dies with the process. `authgate shell` keeps a single
//! session alive so non-remembered logins work too.

mod app;

use std::io;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::{App, Command};

const USAGE: &str = "\
Usage: authgate <command> [args]

Commands:
  login [--remember]      Log in (captcha + account + password)
  register [--remember]   Create an account and log in
  logout                  Forget the stored token
  whoami                  Verify the token and show the current user
  open <path>             Navigate to a page through the guard
  get <path>              Authenticated GET, prints the JSON body
  status                  Show session state without contacting the backend
  shell                   Interactive session (same commands, plus `quit`)
";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match Command::parse(&args) {
        Ok(Some(command)) => command,
        Ok(None) => {
            eprint!("{}", USAGE);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}\n", e);
            eprint!("{}", USAGE);
            std::process::exit(2);
        }
    };

    let mut app = App::new()?;
    info!(base_url = %app.config.base_url, "authgate starting");

    if let Err(e) = app.run(command).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
    Ok(())
}
