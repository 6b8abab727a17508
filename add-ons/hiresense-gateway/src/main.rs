//! HireSense gateway: loads configuration, wires the speech chains, reference corpus, scorer,
//! question source and session store into the orchestrator, and serves the interview API.

mod routes;

use anyhow::Context;
use hiresense_core::{
    ChatScorer, ChunkIndex, Components, ContextSource, HrQuestionBank, InterviewConfig,
    InterviewOrchestrator, ResilientSessionStore, StandardQuestionSource,
};
use routes::{build_app, AppState};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Stdout logging always; a daily rolling file under `log_dir` when configured.
/// The returned guard must live as long as the process to flush the file writer.
fn init_tracing(log_dir: Option<&str>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());

    match log_dir.filter(|d| !d.trim().is_empty()) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "hiresense.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            registry.init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = InterviewConfig::load().context("loading interview configuration")?;
    let _log_guard = init_tracing(config.log_dir.as_deref());

    let speech = config
        .speech
        .build_pipeline()
        .context("building speech provider chains")?;

    let context: Arc<dyn ContextSource> = Arc::new(ChunkIndex::load_or_empty(
        config.interview.context_path().as_deref(),
    ));
    let top_k = config.interview.context_top_k;

    let scorer = ChatScorer::new(Arc::new(config.scoring.build_chain("scoring")))
        .with_context(Arc::clone(&context), top_k);
    let generator = Arc::new(config.scoring.build_chain("questions"));
    let hr_bank = HrQuestionBank::load_or_builtin(config.interview.hr_questions_path().as_deref());
    let questions = StandardQuestionSource::new(hr_bank)
        .with_generator(generator)
        .with_context(context, top_k);

    let store_path = config.storage_path.clone();
    let store = tokio::task::spawn_blocking(move || ResilientSessionStore::open(store_path))
        .await
        .context("opening session store")?;

    let orchestrator = InterviewOrchestrator::new(
        Components {
            speech: Arc::new(speech),
            scorer: Arc::new(scorer),
            questions: Arc::new(questions),
            store: Arc::new(store),
        },
        config.interview.machine_config(),
        config.interview.default_topic.clone(),
    );

    let app = build_app(AppState {
        orchestrator: orchestrator.clone(),
    });

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!(target: "hiresense::gateway", "🎙 HireSense interview gateway listening on {}", addr);

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!(target: "hiresense::gateway", "Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(target: "hiresense::gateway", "Shutdown requested (Ctrl+C); ending any running interview");
            orchestrator.end();
            orchestrator.wait_idle().await;
        }
    }
    Ok(())
}
