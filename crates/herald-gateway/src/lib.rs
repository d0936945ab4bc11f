//! herald-gateway: wires transports, the command dispatcher and the job
//! lifecycle together.
//!
//! ```text
//! Transport (inbound events via mpsc)
//!     ↓
//! run_event_loop → CommandDispatcher::handle
//!     ↓ immediate send / recall          ↓ schedule / cancel / list
//! MessageTransport                     TaskLifecycleManager
//!                                          ↓ JobQueueStore + TimerScheduler
//!                                      fired jobs → TaskLifecycleManager::execute
//! ```

pub mod dispatcher;
pub mod lifecycle;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{info, warn};

use herald_config::HeraldConfig;
use herald_cron::scheduler::TimerScheduler;
use herald_cron::store::JobQueueStore;
use herald_types::{InboundEvent, MessageSegment};

pub use dispatcher::CommandDispatcher;
pub use lifecycle::TaskLifecycleManager;
pub use transport::MessageTransport;

/// Consume inbound events, dispatch each on its own task and post replies
/// back to the originating group.
pub async fn run_event_loop(
    mut inbound: mpsc::Receiver<InboundEvent>,
    dispatcher: Arc<CommandDispatcher>,
    transport: Arc<dyn MessageTransport>,
) {
    info!(transport = transport.name(), "Event loop started");

    while let Some(event) = inbound.recv().await {
        let dispatcher = dispatcher.clone();
        let transport = transport.clone();

        tokio::spawn(async move {
            let Some(reply) = dispatcher.handle(&event).await else {
                return;
            };
            if let Err(e) = transport
                .send_group_message(event.group_id, vec![MessageSegment::text(reply)])
                .await
            {
                warn!(group_id = event.group_id, "Failed to send reply: {e:#}");
            }
        });
    }

    info!("Event loop stopped");
}

/// Start the service: open the queue, re-arm persisted jobs, start the job
/// executor and run the event loop until `inbound` closes.
pub async fn start(
    config: HeraldConfig,
    transport: Arc<dyn MessageTransport>,
    inbound: mpsc::Receiver<InboundEvent>,
) -> anyhow::Result<()> {
    let queue_file = config.queue_file()?;
    let store = Arc::new(
        JobQueueStore::open(&queue_file)
            .with_context(|| format!("failed to open job queue {}", queue_file.display()))?,
    );
    info!(path = %queue_file.display(), "Job queue opened");

    let (scheduler, fired) = TimerScheduler::new();
    let scheduler = Arc::new(scheduler);
    let config = Arc::new(config);
    let lifecycle = Arc::new(TaskLifecycleManager::new(
        store,
        scheduler.clone(),
        transport.clone(),
        config.admin_groups.clone(),
    ));

    lifecycle.reconcile_on_startup();
    info!(pending = scheduler.pending(), "Scheduler armed");
    tokio::spawn(lifecycle.clone().run(fired));

    let dispatcher = Arc::new(CommandDispatcher::new(
        config,
        lifecycle,
        transport.clone(),
    ));
    run_event_loop(inbound, dispatcher, transport).await;
    Ok(())
}
