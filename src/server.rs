use std::sync::Arc;
use std::time::Duration;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, warn};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;
use warp::ws::{Message, WebSocket};
use warp::Filter;

use crate::messages::{InboundFrame, Outbound, Reply};
use crate::registry::ConnectionId;
use crate::session::SessionController;

type Controller = Arc<Mutex<SessionController>>;

/// One controller for the whole process. Every command and every sweep takes
/// the same lock, so they never interleave.
#[derive(Clone)]
pub struct Server {
    controller: Controller,
}

impl Server {
    pub fn new(typing_ttl: Duration) -> Self {
        Server {
            controller: Arc::new(Mutex::new(SessionController::new(typing_ttl))),
        }
    }

    pub fn controller(&self) -> Controller {
        Arc::clone(&self.controller)
    }

    pub fn spawn_typing_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let controller = self.controller();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                controller.lock().await.sweep_typing(Instant::now());
            }
        })
    }

    pub fn ws_route(
        &self,
    ) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
        let server = self.clone();
        warp::path("ws")
            .and(warp::ws())
            .map(move |ws: warp::ws::Ws| {
                let server = server.clone();
                ws.on_upgrade(move |socket| async move {
                    server.handle_connection(socket).await;
                })
            })
    }

    pub async fn connect(&self, outbox: mpsc::UnboundedSender<Outbound>) -> ConnectionId {
        let connection_id = Uuid::new_v4();
        self.controller.lock().await.connect(connection_id, outbox);
        connection_id
    }

    pub async fn disconnect(&self, connection_id: ConnectionId) {
        self.controller.lock().await.disconnect(connection_id);
    }

    pub async fn handle_connection(&self, ws: WebSocket) {
        let (mut ws_tx, mut ws_rx) = ws.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
        let connection_id = self.connect(tx).await;

        let writer = tokio::spawn(async move {
            while let Some(outbound) = rx.recv().await {
                let text = match outbound.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        error!("Failed to encode outbound message: {}", e);
                        continue;
                    }
                };
                if let Err(e) = ws_tx.send(Message::text(text)).await {
                    error!("Failed to send WebSocket message: {}", e);
                    break;
                }
            }
        });

        while let Some(result) = ws_rx.next().await {
            match result {
                Ok(msg) => {
                    if msg.is_close() {
                        break;
                    }
                    if let Ok(text) = msg.to_str() {
                        self.handle_text(connection_id, text).await;
                    }
                }
                Err(e) => {
                    error!("WebSocket error on {}: {}", connection_id, e);
                    break;
                }
            }
        }

        self.disconnect(connection_id).await;
        writer.abort();
    }

    /// Decodes one text frame and runs it. Bad frames never close the connection.
    pub async fn handle_text(&self, connection_id: ConnectionId, text: &str) {
        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Ignoring frame from {}: {}", connection_id, e);
                return;
            }
        };

        let mut controller = self.controller.lock().await;
        match frame.command() {
            Ok(command) => {
                debug!("{} from {}", command.name(), connection_id);
                let reply = controller.handle(connection_id, command);
                if let (Some(ack), Some(reply)) = (frame.ack, reply) {
                    controller.send_ack(&connection_id, ack, reply);
                }
            }
            Err(e) => {
                warn!("Ignoring frame from {}: {}", connection_id, e);
                if let Some(ack) = frame.ack {
                    controller.send_ack(&connection_id, ack, Reply::failure(e.client_message()));
                }
            }
        }
    }
}
