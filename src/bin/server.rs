//! Scheduler + channel server process.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    zkauth_prover::server::run().await
}
