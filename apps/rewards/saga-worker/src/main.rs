//! Reward Saga Worker - Entry Point

#[tokio::main]
async fn main() -> eyre::Result<()> {
    rewards_saga_worker::run().await
}
