use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use herald_channel_onebot::OneBotTransport;
use herald_config::HeraldConfig;

/// Run until Ctrl-C: the webhook feeds the gateway, which returns once the
/// webhook has stopped and its sender is dropped.
pub async fn run_serve(config: HeraldConfig) -> anyhow::Result<()> {
    info!(
        admin_groups = ?config.admin_groups,
        receiver_groups = ?config.receiver_groups,
        "Starting herald"
    );

    let transport = Arc::new(OneBotTransport::new(&config.onebot)?);
    let (tx, rx) = mpsc::channel(256);
    let cancel = CancellationToken::new();

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down");
            shutdown.cancel();
        }
    });

    let webhook = {
        let transport = transport.clone();
        tokio::spawn(async move { transport.serve_events(tx, cancel).await })
    };

    herald_gateway::start(config, transport, rx).await?;
    webhook.await.context("webhook task panicked")??;
    Ok(())
}

/// Print whether the OneBot API answers `get_login_info`.
pub async fn check_api(config: &HeraldConfig) -> anyhow::Result<()> {
    let transport = OneBotTransport::new(&config.onebot)?;
    match transport.api().get_login_info().await {
        Ok(login) => println!("  onebot account: {} ({})", login.user_id, login.nickname),
        Err(e) => println!("  onebot account: unreachable ({e:#})"),
    }
    Ok(())
}
