#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pegada_chat::run().await
}
