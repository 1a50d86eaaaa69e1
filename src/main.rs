#[tokio::main]
async fn main() -> anyhow::Result<()> {
    shipwatch::run().await
}
