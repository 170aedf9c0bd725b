//! Allot CLI binary

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    allot_cli::run().await
}
