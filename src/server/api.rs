use std::error::Error;
use std::net::SocketAddr;
use axum::{
    routing::get,
    Router,
    extract::State,
    response::{Html, IntoResponse},
};
use log::{info, error};

const INDEX_HTML: &str = include_str!("../../static/index.html");
const DEFAULT_WS_PORT: u16 = 4000;

#[derive(Clone)]
struct AppState {
    ws_port: u16,
}

pub fn ws_port_of(ws_addr: &str) -> u16 {
    ws_addr
        .parse::<SocketAddr>()
        .map(|addr| addr.port())
        .or_else(|_| ws_addr.rsplit(':').next().unwrap_or_default().parse::<u16>())
        .unwrap_or(DEFAULT_WS_PORT)
}

/// Serves the browser client and a liveness check. Transcripts are only
/// reachable through a WebSocket session bound to their identifier.
fn router(ws_port: u16) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/healthz", get(health_handler))
        .with_state(AppState { ws_port })
}

pub async fn start_http_server(
    http_port: u16,
    ws_addr: &str,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = format!("0.0.0.0:{}", http_port).parse::<SocketAddr>()?;
    info!("Starting HTTP server on: http://{}", addr);

    let app = router(ws_port_of(ws_addr));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app.into_make_service()).await {
            error!("HTTP server error: {}", e);
        }
    });

    info!("HTTP server started");
    Ok(())
}

fn render_index(ws_port: u16) -> String {
    INDEX_HTML.replace("{ws_port}", &ws_port.to_string())
}

async fn index_handler(State(state): State<AppState>) -> impl IntoResponse {
    Html(render_index(state.ws_port))
}

async fn health_handler() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[test]
    fn ws_port_is_taken_from_listen_address() {
        assert_eq!(ws_port_of("127.0.0.1:4100"), 4100);
        assert_eq!(ws_port_of("localhost:4200"), 4200);
        assert_eq!(ws_port_of("nonsense"), DEFAULT_WS_PORT);
    }

    #[test]
    fn index_page_points_at_websocket_port() {
        let page = render_index(4555);
        assert!(page.contains("4555"));
        assert!(!page.contains("{ws_port}"));
    }

    async fn status_of(uri: &str) -> StatusCode {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        router(4000).oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn serves_client_and_health_check() {
        assert_eq!(status_of("/").await, StatusCode::OK);
        assert_eq!(status_of("/healthz").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn transcripts_are_not_exposed_over_http() {
        assert_eq!(status_of("/api/conversations/Sam").await, StatusCode::NOT_FOUND);
    }
}
