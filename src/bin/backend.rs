use anyhow::Context;
use chat_to_notion_lib::{api, bridge::BridgeCore, shell};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let runtime = shell::RuntimeConfig::from_env()?;
    let data_dir = runtime.data_dir_or(std::env::current_dir()?.join("data"));
    std::fs::create_dir_all(&data_dir).with_context(|| format!("creating {}", data_dir.display()))?;
    shell::init_tracing(&data_dir, "backend.log")?;

    let bridge = BridgeCore::new(data_dir.clone())?;
    let address = runtime.socket_addr();
    let listener = TcpListener::bind(address)
        .await
        .with_context(|| format!("binding {}", address))?;
    tracing::info!(%address, data_dir = %data_dir.display(), "starting chat-to-notion backend");

    api::serve(listener, bridge, async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %error, "failed to listen for shutdown signal");
        }
    })
    .await?;
    Ok(())
}
