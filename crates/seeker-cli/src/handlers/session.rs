use seeker_engine::SessionStore;
use seeker_runtime::RuntimeConfig;

use crate::{EXIT_FATAL, EXIT_OK, OutputFormat, SessionCommand};

/// `seeker session …` — read-side commands over the event-sourced store.
/// These need no API keys, only the state directory.
pub fn handle(command: &SessionCommand) -> i32 {
    let state_dir = RuntimeConfig::default().state_dir;
    let store = match SessionStore::open(&state_dir) {
        Ok(store) => store,
        Err(err) => {
            eprintln!("Error: cannot open session store: {err}");
            return EXIT_FATAL;
        }
    };

    match command {
        SessionCommand::List { format } => list(&store, *format),
        SessionCommand::Show { id, format } => show(&store, id, *format),
        SessionCommand::Migrate { path } => migrate(&store, path),
    }
}

fn list(store: &SessionStore, format: OutputFormat) -> i32 {
    let sessions = match store.list() {
        Ok(sessions) => sessions,
        Err(err) => {
            eprintln!("Error: {err}");
            return EXIT_FATAL;
        }
    };

    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(&sessions) {
            Ok(json) => println!("{json}"),
            Err(err) => {
                eprintln!("Error: {err}");
                return EXIT_FATAL;
            }
        },
        OutputFormat::Plain => {
            if sessions.is_empty() {
                println!("no sessions");
                return EXIT_OK;
            }
            for session in sessions {
                let stats = session.stats();
                println!(
                    "{}  {:<9}  {}  workers={} sources={} ${:.4}",
                    session.id,
                    session.status.as_str(),
                    session.created_at.format("%Y-%m-%d %H:%M"),
                    stats.worker_count,
                    stats.source_count,
                    stats.cost.total_usd,
                );
            }
        }
    }
    EXIT_OK
}

fn show(store: &SessionStore, id: &str, format: OutputFormat) -> i32 {
    let session_id = match id.parse() {
        Ok(id) => id,
        Err(_) => {
            eprintln!("Error: invalid session id: {id}");
            return EXIT_FATAL;
        }
    };
    let session = match store.load(session_id) {
        Ok(session) => session,
        Err(err) => {
            eprintln!("Error: {err}");
            return EXIT_FATAL;
        }
    };

    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(&session) {
            Ok(json) => println!("{json}"),
            Err(err) => {
                eprintln!("Error: {err}");
                return EXIT_FATAL;
            }
        },
        OutputFormat::Plain => {
            println!("session  {}", session.id);
            println!("query    {}", session.query);
            println!("status   {}", session.status.as_str());
            println!("version  {}", session.version);
            for worker in &session.workers {
                println!(
                    "  worker {}  {:?}  {} facts  {}",
                    worker.number,
                    worker.status,
                    worker.facts.len(),
                    worker.objective,
                );
            }
            if let Some(report) = &session.report {
                println!("report   {} ({} citations)", report.title, report.citations.len());
            }
            if let Some(error) = &session.error {
                println!("error    {error}");
            }
        }
    }
    EXIT_OK
}

fn migrate(store: &SessionStore, path: &std::path::Path) -> i32 {
    match store.migrate_legacy(path) {
        Ok(id) => {
            println!("migrated {} -> {id}", path.display());
            EXIT_OK
        }
        Err(err) => {
            eprintln!("Error: {err}");
            EXIT_FATAL
        }
    }
}
