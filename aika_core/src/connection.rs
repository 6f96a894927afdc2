use std::future::Future;
use std::time::Duration;

use flume::Sender;
use tokio::time::sleep;

use crate::api::ApiClient;

/// Delay between health checks while the backend is unreachable.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    Connected,
    #[default]
    Disconnected,
    Connecting,
    Reconnecting,
}

impl ConnectionStatus {
    pub fn label(self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::Disconnected => "Disconnected",
            ConnectionStatus::Connecting => "Connecting…",
            ConnectionStatus::Reconnecting => "Reconnecting…",
        }
    }

    pub fn is_connected(self) -> bool {
        self == ConnectionStatus::Connected
    }
}

/// A failed check right after being connected reads as a blip, not an outage.
pub fn next_status(previous: ConnectionStatus, healthy: bool) -> ConnectionStatus {
    match (healthy, previous) {
        (true, _) => ConnectionStatus::Connected,
        (false, ConnectionStatus::Connected) => ConnectionStatus::Reconnecting,
        (false, _) => ConnectionStatus::Disconnected,
    }
}

/// Poll `/health` until the receiver goes away.
pub async fn monitor_connection_forever(
    client: ApiClient,
    tx: Sender<ConnectionStatus>,
    interval: Duration,
) {
    let client = &client;
    run_monitor(
        move || client.health_check(),
        tx,
        interval,
        RECONNECT_DELAY.min(interval),
    )
    .await;
}

async fn run_monitor<F, Fut>(
    mut check_health: F,
    tx: Sender<ConnectionStatus>,
    interval: Duration,
    retry_delay: Duration,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let mut status = ConnectionStatus::Connecting;
    if tx.send(status).is_err() {
        return;
    }

    loop {
        let next = next_status(status, check_health().await);
        if next != status {
            match next {
                ConnectionStatus::Connected => tracing::info!("Backend connected"),
                other => tracing::warn!("Backend health check failed; status {:?}", other),
            }
        }
        status = next;

        if tx.send(status).is_err() {
            tracing::debug!("Connection status receiver dropped; stopping monitor");
            return;
        }

        let delay = if status.is_connected() { interval } else { retry_delay };
        sleep(delay).await;
    }
}
