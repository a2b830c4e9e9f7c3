//! Progress WebSocket: the server pushes job frames; the client only supplies
//! a `sessionId` query parameter at connect time.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use super::AppState;
use crate::pipeline::batch::ProgressFrame;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsParams {
    pub session_id: Option<String>,
}

/// `GET /ws/document-progress?sessionId=...`
pub async fn document_progress(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> Response {
    let rx = state.batch.jobs().subscribe();
    ws.on_upgrade(move |socket| push_frames(socket, rx, params.session_id))
}

/// Frames without a session id go to every subscriber; tagged frames only to
/// the matching session.
fn frame_matches(frame: &ProgressFrame, session_id: Option<&str>) -> bool {
    match (&frame.session_id, session_id) {
        (None, _) => true,
        (Some(tag), Some(want)) => tag == want,
        (Some(_), None) => false,
    }
}

async fn push_frames(
    mut socket: WebSocket,
    mut rx: tokio::sync::broadcast::Receiver<ProgressFrame>,
    session_id: Option<String>,
) {
    info!(session = session_id.as_deref().unwrap_or("-"), "progress socket opened");
    loop {
        tokio::select! {
            frame = rx.recv() => match frame {
                Ok(frame) => {
                    if !frame_matches(&frame, session_id.as_deref()) {
                        continue;
                    }
                    let Ok(payload) = serde_json::to_string(&frame) else {
                        continue;
                    };
                    if socket.send(Message::Text(payload)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "progress subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                // No client protocol beyond connect; drain pings, stop on close.
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
        }
    }
    debug!("progress socket closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::batch::FrameKind;
    use serde_json::json;

    fn frame(session_id: Option<&str>) -> ProgressFrame {
        ProgressFrame {
            kind: FrameKind::Progress,
            data: json!({}),
            session_id: session_id.map(str::to_string),
        }
    }

    #[test]
    fn untagged_frames_reach_everyone() {
        assert!(frame_matches(&frame(None), Some("s1")));
        assert!(frame_matches(&frame(None), None));
    }

    #[test]
    fn tagged_frames_only_reach_their_session() {
        assert!(frame_matches(&frame(Some("s1")), Some("s1")));
        assert!(!frame_matches(&frame(Some("s1")), Some("s2")));
        assert!(!frame_matches(&frame(Some("s1")), None));
    }
}
