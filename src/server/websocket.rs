use crate::models::websocket::{ClientMessage, ServerMessage};
use crate::session::{SessionError, SessionEvent, SessionLoop, SessionState, Renderer, View};

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use log::{info, warn, error};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_tungstenite::{accept_async, WebSocketStream};
use tokio_tungstenite::tungstenite::protocol::Message;
use uuid::Uuid;

const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

impl From<ClientMessage> for SessionEvent {
    fn from(msg: ClientMessage) -> Self {
        match msg {
            ClientMessage::Identify { user_id } => SessionEvent::Identify(user_id),
            ClientMessage::Input { content, send, input_generation } =>
                SessionEvent::Submit { text: content, send_clicked: send, input_generation },
        }
    }
}

impl From<View> for ServerMessage {
    fn from(view: View) -> Self {
        match view {
            View::IdentifierPrompt { greeting } => ServerMessage::Identify { greeting },
            View::Transcript { user_id, welcome, entries, input_generation, thinking } => ServerMessage::Transcript {
                user_id,
                welcome,
                messages: entries,
                input_generation,
                thinking,
                timestamp: Utc::now().timestamp(),
            },
        }
    }
}

/// Sends every rendered view to the client as one JSON text frame.
pub struct WsRenderer<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
}

impl<S> WsRenderer<S>
    where S: AsyncRead + AsyncWrite + Unpin + Send
{
    pub fn new(sink: SplitSink<WebSocketStream<S>, Message>) -> Self {
        Self { sink }
    }

    async fn send_frame(&mut self, frame: Message) -> Result<(), SessionError> {
        self.sink.send(frame).await.map_err(|e| SessionError::Render(e.to_string()))
    }

    pub async fn send(&mut self, msg: &ServerMessage) -> Result<(), SessionError> {
        let json = serde_json::to_string(msg).map_err(|e| SessionError::Render(e.to_string()))?;
        self.send_frame(Message::Text(json)).await
    }

    pub async fn send_error(&mut self, message: impl Into<String>) -> Result<(), SessionError> {
        self.send(&ServerMessage::Error { message: message.into() }).await
    }
}

#[async_trait]
impl<S> Renderer for WsRenderer<S>
    where S: AsyncRead + AsyncWrite + Unpin + Send
{
    async fn render(&mut self, view: View) -> Result<(), SessionError> {
        self.send(&ServerMessage::from(view)).await
    }
}

pub async fn start_ws_server(
    addr: &str,
    session_loop: Arc<SessionLoop>,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    info!("WS server listening on: {}", addr);

    loop {
        let (stream, peer) = listener.accept().await?;
        info!("Incoming connection from: {}", peer);
        let session_loop = Arc::clone(&session_loop);

        tokio::spawn(async move {
            match accept_async(stream).await {
                Ok(ws) => handle_connection(peer, ws, session_loop).await,
                Err(e) => error!("Handshake failed for {}: {}", peer, e),
            }
        });
    }
}

/// Runs one session for the lifetime of the connection.
pub async fn handle_connection<S>(
    peer: SocketAddr,
    websocket: WebSocketStream<S>,
    session_loop: Arc<SessionLoop>
)
    where S: AsyncRead + AsyncWrite + Unpin + Send
{
    let (tx, mut rx) = websocket.split();
    let mut renderer = WsRenderer::new(tx);
    let mut state = SessionState::default();
    let session_id = Uuid::new_v4();
    info!("Assigned session ID {} to {}", session_id, peer);

    if let Err(e) = session_loop.start(&mut state, &mut renderer).await {
        error!("Failed to draw initial view for {}: {}", peer, e);
        return;
    }

    while let Some(msg) = rx.next().await {
        let message = match msg {
            Ok(message) => message,
            Err(e) => {
                match e {
                    | tokio_tungstenite::tungstenite::Error::ConnectionClosed
                    | tokio_tungstenite::tungstenite::Error::Protocol(_) => {
                        info!("WebSocket connection closed or protocol error for {}: {}", peer, e);
                    }
                    _ => {
                        error!("Error receiving message from {}: {}", peer, e);
                    }
                }
                break;
            }
        };

        if message.len() > MAX_MESSAGE_SIZE {
            warn!("Message from {} exceeds size limit ({} > {})", peer, message.len(), MAX_MESSAGE_SIZE);
            if renderer.send_error("Message too large").await.is_err() {
                error!("Failed to send size limit error to {}", peer);
            }
            break;
        }

        match message {
            Message::Text(text) => {
                let event = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(client_msg) => SessionEvent::from(client_msg),
                    Err(e) => {
                        error!("Failed to parse message from {}: {}", peer, e);
                        if renderer.send_error(format!("Failed to parse message: {}", e)).await.is_err() {
                            break;
                        }
                        continue;
                    }
                };

                match session_loop.handle(&mut state, event, &mut renderer).await {
                    Ok(()) => {}
                    Err(SessionError::Render(e)) => {
                        error!("Failed to deliver view to {}: {}", peer, e);
                        break;
                    }
                    Err(e) => {
                        error!("Turn aborted for session {}: {}", session_id, e);
                        if renderer.send_error(e.to_string()).await.is_err() {
                            break;
                        }
                        // Clear the thinking indicator without retrying the turn.
                        if renderer.render(SessionLoop::view(&state, false)).await.is_err() {
                            break;
                        }
                    }
                }
            }
            Message::Close(_) => {
                info!("Received close frame from {}", peer);
                break;
            }
            Message::Ping(ping_data) => {
                if renderer.send_frame(Message::Pong(ping_data)).await.is_err() {
                    error!("Failed to send pong to {}", peer);
                    break;
                }
            }
            Message::Binary(_) => {
                warn!("Ignoring binary message from {}", peer);
            }
            Message::Pong(_) | Message::Frame(_) => {}
        }
    }
    info!("WebSocket connection closed for {} (session ID: {})", peer, session_id);
}
