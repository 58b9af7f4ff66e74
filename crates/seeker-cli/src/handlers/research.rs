use std::io::Write as _;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use seeker_engine::SessionStore;
use seeker_llm::{ChatClient, ChatMessage, ChatOptions, OpenAiCompatClient, Pricing};
use seeker_runtime::{
    CostTracker, EventBus, FsReportSink, Orchestrator, QueryClassifier, QueryType, RuntimeConfig,
};
use seeker_tools::{BraveSearchProvider, FetchTool, ParseFileTool, SearchTool, ToolRegistry};
use seeker_types::{CancelReason, EventSink, Report, Session, SessionId, SessionStatus};

use crate::{Cli, EXIT_CONFIG, EXIT_FATAL, EXIT_INTERRUPT, EXIT_OK, render};

/// `seeker [--query …]` — one-shot research or the interactive loop.
pub fn handle(cli: Cli) -> i32 {
    let mut config = match RuntimeConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Configuration error: {err}");
            return EXIT_CONFIG;
        }
    };
    if let Some(model) = &cli.model {
        config.model = model.clone();
    }
    if let Some(workers) = cli.max_workers {
        config.max_concurrency = workers.max(1);
    }
    if let Some(vault) = &cli.vault {
        config.vault_path = Some(vault.clone());
    }
    if cli.verbose {
        config.verbose = true;
    }
    config.mode = cli.mode.into();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Error: cannot start runtime: {err}");
            return EXIT_FATAL;
        }
    };
    runtime.block_on(main_flow(config, cli))
}

async fn main_flow(config: RuntimeConfig, cli: Cli) -> i32 {
    let store = match SessionStore::open(&config.state_dir) {
        Ok(store) => Arc::new(store),
        Err(err) => {
            eprintln!("Error: cannot open session store: {err}");
            return EXIT_FATAL;
        }
    };
    let bus = Arc::new(EventBus::new());

    // One consumer prints progress; it drains and ends when the bus closes.
    let mut stream = bus.subscribe_all();
    let verbose = config.verbose;
    let printer = tokio::spawn(async move {
        while let Some(event) = stream.recv().await {
            if let Some(line) = render::line(&event, verbose) {
                eprintln!("{line}");
            }
        }
    });

    let attached = cli
        .session
        .as_deref()
        .and_then(|raw| raw.parse::<SessionId>().ok())
        .and_then(|id| store.load(id).ok());

    let code = match &cli.query {
        Some(query) => run_research(&config, &store, &bus, query).await.0,
        None => interactive(&config, &store, &bus, attached).await,
    };

    bus.close();
    let _ = printer.await;
    code
}

/// Run one research session; returns the exit code and the final snapshot.
async fn run_research(
    config: &RuntimeConfig,
    store: &Arc<SessionStore>,
    bus: &Arc<EventBus>,
    query: &str,
) -> (i32, Option<Session>) {
    let session_id = SessionId::new();
    let sink: Arc<dyn EventSink> = bus.clone();
    let tracker = CostTracker::new(session_id, Pricing::default(), sink.clone());

    let client = match OpenAiCompatClient::new(&config.llm_base_url, &config.llm_api_key, &config.model)
    {
        Ok(client) => client.with_usage_hook(tracker.usage_hook()),
        Err(err) => {
            eprintln!("Error: {err}");
            return (EXIT_FATAL, None);
        }
    };
    let client: Arc<dyn ChatClient> = Arc::new(client);

    let registry = match build_registry(config, session_id, sink) {
        Ok(registry) => registry,
        Err(err) => {
            eprintln!("Error: {err}");
            return (EXIT_FATAL, None);
        }
    };

    let mut orchestrator = Orchestrator::new(
        config.clone(),
        session_id,
        client,
        registry,
        store.clone(),
        bus.clone(),
        tracker,
    );
    if let Some(vault) = &config.vault_path {
        orchestrator = orchestrator.with_report_sink(Arc::new(FsReportSink::new(vault)));
    }
    let orchestrator = Arc::new(orchestrator);

    let interrupt = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                orchestrator.cancel_with(CancelReason::UserInterrupt);
            }
        })
    };

    let result = orchestrator.run(query).await;
    interrupt.abort();

    let snapshot = store.load(session_id).ok();
    let code = match result {
        Ok(summary) => match summary.status {
            SessionStatus::Complete => {
                if let Some(report) = &summary.report {
                    print_report(report);
                }
                EXIT_OK
            }
            SessionStatus::Cancelled => {
                match summary.cancel_reason {
                    Some(CancelReason::UserInterrupt) => EXIT_INTERRUPT,
                    _ => EXIT_FATAL,
                }
            }
            _ => EXIT_FATAL,
        },
        Err(err) => {
            eprintln!("Error: {err}");
            EXIT_FATAL
        }
    };
    (code, snapshot)
}

fn build_registry(
    config: &RuntimeConfig,
    session_id: SessionId,
    sink: Arc<dyn EventSink>,
) -> anyhow::Result<Arc<ToolRegistry>> {
    let provider = BraveSearchProvider::new(&config.search_api_key)?;
    let search =
        SearchTool::new(Arc::new(provider)).with_blacklist(config.host_blacklist.iter().cloned());
    let registry = ToolRegistry::new(session_id)
        .with_sink(sink)
        .register(Arc::new(search))
        .register(Arc::new(FetchTool::new()?))
        .register(Arc::new(ParseFileTool::new()));
    Ok(Arc::new(registry))
}

fn print_report(report: &Report) {
    println!("\n{}", report.full_content);
    if !report.citations.is_empty() {
        println!("\n## References\n");
        for citation in &report.citations {
            println!("{}. {}", citation.id, citation.url);
        }
    }
}

/// Line-oriented interactive mode.
async fn interactive(
    config: &RuntimeConfig,
    store: &Arc<SessionStore>,
    bus: &Arc<EventBus>,
    mut last: Option<Session>,
) -> i32 {
    println!("seeker — type a research query, `exit` to quit");
    if let Some(session) = &last {
        println!("attached to session {} ({})", session.id, session.query);
    }

    let classifier_client =
        match OpenAiCompatClient::new(&config.llm_base_url, &config.llm_api_key, &config.model) {
            Ok(client) => Arc::new(client) as Arc<dyn ChatClient>,
            Err(err) => {
                eprintln!("Error: {err}");
                return EXIT_FATAL;
            }
        };
    let classifier = QueryClassifier::new(classifier_client.clone(), config.classifier_model.clone());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("seeker> ");
        let _ = std::io::stdout().flush();

        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => {
                println!();
                return EXIT_INTERRUPT;
            }
        };
        let Ok(Some(line)) = line else {
            return EXIT_OK;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "exit" || input == "quit" {
            return EXIT_OK;
        }
        append_history(config, input);

        let report = last.as_ref().and_then(|s| s.report.as_ref());
        let summary = report.map(|r| r.summary.clone()).unwrap_or_default();
        let classification = classifier
            .classify(input, report.is_some(), &summary, &CancellationToken::new())
            .await;

        match (classification.kind, report) {
            (QueryType::Question, Some(report)) => {
                answer_question(&classifier_client, report, input).await;
            }
            _ => {
                let (code, snapshot) = run_research(config, store, bus, &classification.topic).await;
                if code == EXIT_INTERRUPT {
                    return EXIT_INTERRUPT;
                }
                if let Some(snapshot) = snapshot {
                    last = Some(snapshot);
                }
            }
        }
    }
}

/// Answer a follow-up from the existing report, no new research.
async fn answer_question(client: &Arc<dyn ChatClient>, report: &Report, question: &str) {
    let prompt = format!(
        "Answer the question using only this research report. Cite the report's [n] markers \
         where relevant. If the report does not contain the answer, say so.\n\n\
         Report:\n{}\n\nQuestion: {question}",
        report.full_content
    );
    let options = ChatOptions::scoped("qa");
    match client
        .chat(&[ChatMessage::user(prompt)], &options, &CancellationToken::new())
        .await
    {
        Ok(response) => println!("\n{}\n", response.message.content),
        Err(err) => eprintln!("Error: {err}"),
    }
}

fn append_history(config: &RuntimeConfig, line: &str) {
    let Some(path) = &config.history_file else {
        return;
    };
    if let Ok(mut file) = std::fs::OpenOptions::new().create(true).append(true).open(path) {
        let _ = writeln!(file, "{line}");
    }
}
