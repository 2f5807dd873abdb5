//! Binary entrypoint: load configuration, wire the dependency graph, and
//! run until a shutdown signal arrives.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dtm_app::run_app().await
}
