use dualrag_api::AppState;
use dualrag_cli::{build_retriever, init_tracing, load_settings};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = load_settings()?;
    init_tracing(&settings.log, false);

    let (retriever, scheduler) = build_retriever(&settings).await?;
    let periodic = scheduler.spawn_periodic(settings.refresh.interval());
    info!(every_secs = settings.refresh.interval_secs, "periodic guidance refresh scheduled");

    let result = dualrag_api::serve(AppState::new(settings, retriever, scheduler)).await;
    periodic.abort();
    result
}
