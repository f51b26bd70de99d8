use std::sync::Arc;

use tracing::info;

use aecaxis_flow::SystemClock;
use aecaxis_live_sync::{
    BridgeUpdate, ConnectionState, PushSession, SessionConfig, StatusBridge, WsConnector,
};

use crate::config::IngestConfig;

pub async fn run(config: &IngestConfig, project_id: String, rfq_ids: Vec<String>) -> anyhow::Result<()> {
    let connector = WsConnector::new(&config.channel());
    info!(url = connector.url(), project = %project_id, "watching");

    let mut session_config = SessionConfig::new(project_id);
    session_config.rfq_ids = rfq_ids;
    let (session, events) = PushSession::start(session_config, Arc::new(connector));

    let (bridge, mut updates) = StatusBridge::new(config.bridge(), SystemClock::shared());
    let cache = bridge.cache();
    let bridge_task = tokio::spawn(bridge.run(events, session.cancel_token()));

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Some(update) => {
                    for line in render(&update) {
                        println!("{line}");
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    session.shutdown().await;
    bridge_task.await?;
    while let Ok(update) = updates.try_recv() {
        for line in render(&update) {
            println!("{line}");
        }
    }

    let files = cache.files();
    info!(files = files.len(), "stopped watching");
    Ok(())
}

fn render(update: &BridgeUpdate) -> Vec<String> {
    match update {
        BridgeUpdate::Connection(state) => vec![match state {
            ConnectionState::Connecting => "connecting...".to_string(),
            ConnectionState::Connected => "connected".to_string(),
            ConnectionState::Reconnecting { attempt } => format!("reconnecting (attempt {attempt})"),
            ConnectionState::Disconnected => "disconnected".to_string(),
        }],
        BridgeUpdate::FileStatuses(batch) => batch
            .iter()
            .map(|u| {
                format!(
                    "file   {} {} {}",
                    u.ifc_file_id,
                    u.status,
                    u.filename.as_deref().unwrap_or("")
                )
                .trim_end()
                .to_string()
            })
            .collect(),
        BridgeUpdate::Price(p) => {
            let material = p.material().unwrap_or(&p.rfq_id);
            let price = |v: Option<f64>| v.map_or_else(|| "?".to_string(), |v| format!("{v:.2}"));
            vec![format!(
                "price  {material} {} -> {}",
                price(p.data.old_price),
                price(p.data.new_price)
            )]
        }
        BridgeUpdate::Activity(item) => vec![format!(
            "{}  {}",
            item.received_at.format("%H:%M:%S"),
            item.summary
        )],
    }
}
