//! Smoke test for the CLI demo wiring.

use crmlens_cli::config::ToolkitConfig;
use crmlens_cli::demo;

#[tokio::test]
async fn demo_runs_to_completion() {
    let storage = tempfile::tempdir().expect("tempdir");
    let config = ToolkitConfig::default();
    demo::run(&config, Some(storage.path()))
        .await
        .expect("demo flow");
}
