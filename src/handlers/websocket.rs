use futures_util::stream::StreamExt;
use log::{debug, error, info};
use std::sync::Arc;
use warp::ws::WebSocket;

use crate::auth::user::Session;
use crate::config::HubConfig;
use crate::core::connection::Connection;
use crate::core::hub::HubHandle;
use crate::core::pump::{read_pump, write_pump, PumpSettings};

// Handle an upgraded, already authenticated WebSocket
pub async fn handle_ws_client(socket: WebSocket, session: Session, hub: HubHandle, config: HubConfig) {
    let Session {
        profile,
        workspace_id,
    } = session;
    let (connection, queue) = Connection::new(profile, workspace_id, config.outbound_queue_capacity);

    // The queue buffers the welcome until the writer starts
    if let Err(e) = hub.register(Arc::clone(&connection)) {
        error!("Failed to register connection {}: {}", connection.id(), e);
        return;
    }
    info!(
        "Client connected: {} (user {}, workspace {})",
        connection.id(),
        connection.user_id(),
        workspace_id
    );

    let settings = PumpSettings::from(&config);
    let (ws_tx, ws_rx) = socket.split();
    let mut writer = tokio::spawn(write_pump(
        Arc::clone(&connection),
        queue,
        ws_tx,
        hub.clone(),
        settings,
    ));

    tokio::select! {
        _ = read_pump(Arc::clone(&connection), ws_rx, hub.clone(), settings) => {
            // Let the writer flush what is queued, send a close frame and exit
            connection.close();
            if let Err(e) = writer.await {
                error!("Writer task of connection {} failed: {}", connection.id(), e);
            }
        }
        result = &mut writer => {
            if let Err(e) = result {
                error!("Writer task of connection {} failed: {}", connection.id(), e);
            }
            // The reader was dropped before it could unregister
            connection.close();
            if hub.unregister(connection.id()).is_err() {
                debug!("Hub gone while tearing down {}", connection.id());
            }
        }
    }

    info!(
        "Client disconnected: {} after {:?}",
        connection.id(),
        connection.connection_duration()
    );
}
