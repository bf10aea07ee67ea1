use axum::{
    debug_handler,
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{session, AppResult};

use super::{ChatBroker, Participant};

#[derive(Debug, Deserialize)]
struct ClientFrame {
    text: String,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn chat_ws(
    State(broker): State<ChatBroker>,
    State(db_pool): State<SqlitePool>,
    session: Session,
    Path(request_id): Path<Uuid>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> AppResult<Response> {
    // who may join is decided before whether the request can be upgraded
    let identity = session::identity(&session).await?;
    let participant = super::participant(&db_pool, identity.as_ref(), request_id).await?;
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, broker, request_id, participant)))
}

async fn handle_socket(
    socket: WebSocket,
    broker: ChatBroker,
    request_id: Uuid,
    participant: Participant,
) {
    let (connection, mut outbound) = broker.connect();
    if let Err(e) = broker.join(connection.id(), request_id) {
        tracing::warn!(%request_id, "could not join room: {e}");
        return;
    }
    tracing::info!(
        %request_id,
        connection = %connection.id(),
        role = %participant.role,
        "chat connected"
    );

    let (mut ws_sender, mut ws_receiver) = socket.split();

    let mut push_task = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let frame = match serde_json::to_string(&message) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::error!("could not encode chat message: {e}");
                    continue;
                }
            };
            if ws_sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            frame = ws_receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let frame: ClientFrame = match serde_json::from_str(text.as_str()) {
                        Ok(frame) => frame,
                        Err(e) => {
                            tracing::warn!(%request_id, "invalid chat frame: {e}");
                            continue;
                        }
                    };
                    let sent = broker
                        .send(request_id, participant.role, &participant.name, &frame.text)
                        .await;
                    if let Err(e) = sent {
                        tracing::warn!(%request_id, "chat message not sent: {e}");
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            _ = &mut push_task => break,
        }
    }

    push_task.abort();
    tracing::info!(%request_id, connection = %connection.id(), "chat disconnected");
}
