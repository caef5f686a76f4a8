#[tokio::main]
async fn main() -> anyhow::Result<()> {
    quicklaunch::init_tracing();
    quicklaunch::run().await
}
