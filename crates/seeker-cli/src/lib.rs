mod args;
mod handlers;
mod render;

pub use args::*;

pub const EXIT_OK: i32 = 0;
pub const EXIT_FATAL: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;
pub const EXIT_INTERRUPT: i32 = 130;

/// Entry point behind `main`; returns the process exit code.
pub fn run(cli: Cli) -> i32 {
    init_tracing(cli.verbose);

    if let Some(Command::Session { command }) = &cli.command {
        return handlers::session::handle(command);
    }
    handlers::research::handle(cli)
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default_filter = if verbose || std::env::var("VERBOSE").as_deref() == Ok("1") {
        "seeker=debug"
    } else {
        "seeker=info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    // A second init in tests is fine; ignore the error.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
