mod config;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use koma_core::error::CoreError;
use koma_core::thresholds::ValidationConfig;
use koma_core::visual::VisualAnalyzer;
use koma_judge::{JudgeConfig, JudgeRotation};
use koma_pipeline::{ValidationOrchestrator, ValidationReport};

use crate::config::WorkerConfig;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "koma_worker=info,koma_pipeline=info,koma_judge=info,koma_core=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping after the current window");
            on_signal.cancel();
        }
    });

    if let Err(e) = run(cancel).await {
        tracing::error!(error = %e, "Validation run failed");
        std::process::exit(1);
    }
}

async fn run(cancel: CancellationToken) -> Result<(), CoreError> {
    let worker = WorkerConfig::from_env()?;
    let judge = JudgeConfig::from_env()?;
    let config = ValidationConfig {
        window_length: worker.window_length,
        ..Default::default()
    };

    let gateway = Arc::new(judge.build_gateway(Arc::new(JudgeRotation::new()))?);
    let analyzer = Arc::new(VisualAnalyzer::new(config.visual.clone()));
    let orchestrator = ValidationOrchestrator::new(analyzer, gateway, config)?;

    tracing::info!(manifest = %worker.manifest.display(), "Worker starting validation run");
    let verdict = orchestrator.run_manifest(&worker.manifest, &cancel).await?;

    let report = ValidationReport::new(verdict);
    report.persist(&worker.report_dir).await;
    tracing::info!(
        run_id = %report.run_id,
        overall_score = report.verdict.overall_score,
        human_review = report.verdict.recommend_human_review,
        "Worker finished",
    );
    Ok(())
}
