use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        events::SessionErrorEvent,
        ws::{ClientMessage, WsFrame},
    },
    services::{events, session_service, timer_service},
    state::{ClientConnection, SharedState},
};

const IDENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle the full lifecycle for an individual participant WebSocket
/// connection: identification, session subscription, answer frames, and the
/// disconnect bookkeeping that may suspend the session's timers.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let initial_message = match tokio::time::timeout(IDENT_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => {
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Ok(_))) => {
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Err(err))) => {
            warn!(error = %err, "websocket receive error");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(None) | Err(_) => {
            warn!("websocket subscription timed out");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let inbound = match ClientMessage::from_json_str(&initial_message) {
        Ok(message) => message,
        Err(err) => {
            warn!(error = %err, "failed to parse client message");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let ClientMessage::Subscribe {
        code,
        user_id,
        display_name,
    } = inbound
    else {
        warn!("first message was not a subscription");
        let _ = outbound_tx.send(Message::Close(None));
        finalize(writer_task, outbound_tx).await;
        return;
    };

    let joined = match session_service::join(&state, user_id, &code, display_name, true).await {
        Ok(joined) => joined,
        Err(err) => {
            send_frame(
                &outbound_tx,
                events::EVENT_ERROR,
                &SessionErrorEvent {
                    message: err.to_string(),
                },
            );
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };
    let session_id = joined.session_id;

    let connection_id = Uuid::new_v4();
    state.clients().insert(
        connection_id,
        ClientConnection {
            session_id,
            user_id,
            tx: outbound_tx.clone(),
        },
    );
    info!(%session_id, %user_id, "client subscribed");

    // Bridge the session's broadcast feed onto this connection's writer.
    let forward_task = spawn_event_forwarder(&state, session_id, outbound_tx.clone());

    // Initial sync: full snapshot, then the in-flight selection if the
    // client rejoined mid-question.
    match session_service::get_state(&state, session_id).await {
        Ok(snapshot) => send_frame(&outbound_tx, events::EVENT_SESSION_STATE, &snapshot),
        Err(err) => warn!(%session_id, error = %err, "failed to build initial snapshot"),
    }
    match session_service::restore_answer(&state, session_id, user_id).await {
        Ok(Some(restore)) => send_frame(&outbound_tx, events::EVENT_ANSWER_RESTORE, &restore),
        Ok(None) => {}
        Err(err) => warn!(%session_id, error = %err, "failed to restore selection"),
    }

    // The room is live again: restart any timer that was suspended while the
    // session sat empty. Remaining time comes from the stored deadline.
    if let Err(err) = timer_service::resume_if_needed(&state, session_id).await {
        warn!(%session_id, error = %err, "failed to resume timers");
    }

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match ClientMessage::from_json_str(&text) {
                Ok(ClientMessage::SubmitAnswer {
                    question_id,
                    selected_answer_ids,
                }) => {
                    // The confirmation frame is targeted by submit_answer;
                    // only failures need a reply here.
                    if let Err(err) = session_service::submit_answer(
                        &state,
                        session_id,
                        user_id,
                        question_id,
                        selected_answer_ids,
                    )
                    .await
                    {
                        send_frame(
                            &outbound_tx,
                            events::EVENT_ERROR,
                            &SessionErrorEvent {
                                message: err.to_string(),
                            },
                        );
                    }
                }
                Ok(ClientMessage::Subscribe { .. }) => {
                    warn!(%user_id, "ignoring duplicate subscription message");
                }
                Ok(ClientMessage::Unknown) => {
                    warn!(%user_id, "ignoring unknown client message");
                }
                Err(err) => {
                    warn!(%user_id, error = %err, "failed to parse client message");
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(%session_id, %user_id, "client closed");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(%session_id, %user_id, error = %err, "websocket error");
                break;
            }
        }
    }

    state.clients().remove(&connection_id);
    forward_task.abort();

    if !state.user_connected(session_id, user_id) {
        session_service::mark_disconnected(&state, session_id, user_id).await;
    }
    if state.connection_count(session_id) == 0 {
        // Nobody is watching: stop the clocks but leave the session alone.
        // The host may reconnect and resume from the stored deadline.
        timer_service::suspend(&state, session_id);
        info!(%session_id, "session room empty; timers suspended");
    }

    info!(%session_id, %user_id, "client disconnected");
    finalize(writer_task, outbound_tx).await;
}

/// Forward hub broadcasts onto the connection's writer channel.
fn spawn_event_forwarder(
    state: &SharedState,
    session_id: Uuid,
    tx: mpsc::UnboundedSender<Message>,
) -> JoinHandle<()> {
    let mut stream =
        tokio_stream::wrappers::BroadcastStream::new(state.hub().subscribe(session_id));
    tokio::spawn(async move {
        while let Some(received) = stream.next().await {
            match received {
                Ok(event) => {
                    let frame = WsFrame::from(event);
                    if send_json(&tx, &frame).is_err() {
                        break;
                    }
                }
                // Skip lagged events but keep the connection alive.
                Err(BroadcastStreamRecvError::Lagged(_)) => continue,
            }
        }
    })
}

/// Serialize a payload into the standard event envelope and queue it on the
/// connection's writer. Delivery failures just mean the client is gone.
pub fn send_frame<T>(tx: &mpsc::UnboundedSender<Message>, event: &str, payload: &T)
where
    T: ?Sized + Serialize,
{
    let frame = match serde_json::to_value(payload) {
        Ok(data) => WsFrame {
            event: event.to_string(),
            data,
        },
        Err(err) => {
            warn!(event, error = %err, "failed to serialize frame payload");
            return;
        }
    };
    let _ = send_json(tx, &frame);
}

fn send_json<T: Serialize>(tx: &mpsc::UnboundedSender<Message>, frame: &T) -> Result<(), ()> {
    let payload = match serde_json::to_string(frame) {
        Ok(payload) => payload,
        Err(err) => {
            // Serialization failure is a permanent error; dropping the frame
            // beats tearing the connection down.
            warn!(error = %err, "failed to serialize websocket frame");
            return Ok(());
        }
    };
    tx.send(Message::Text(payload.into())).map_err(|_| ())
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
