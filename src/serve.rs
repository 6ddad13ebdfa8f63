/// Local capture server: serves the signing page and one submission endpoint,
/// writing received signatures into the shared `SignatureSession`.
///
/// `start` registers the running listener in the session, so at most one
/// capture server exists per process; `stop` releases it and shuts the
/// listener down. A submission that races the shutdown is simply dropped with
/// the connection.
use crate::config::ServerConfig;
use crate::page::SIGN_PAGE;
use crate::session::{SessionError, SignatureSession};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// How long to wait for in-flight connections before aborting the listener.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Errors that can occur when starting or stopping the capture server.
#[derive(Debug)]
pub enum ServeError {
    /// A capture session is already active.
    AlreadyRunning,
    /// The fixed local port could not be bound. Not retried on another port:
    /// the URL opened in the browser must match the bound address.
    PortUnavailable { port: u16, source: std::io::Error },
}

impl std::fmt::Display for ServeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServeError::AlreadyRunning => {
                write!(f, "a signature capture session is already running")
            }
            ServeError::PortUnavailable { port, source } => {
                write!(f, "cannot bind capture server to port {}: {}", port, source)
            }
        }
    }
}

impl std::error::Error for ServeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServeError::AlreadyRunning => None,
            ServeError::PortUnavailable { source, .. } => Some(source),
        }
    }
}

/// Ownership token for a running listener. Every started server has exactly
/// one designated stopper; dropping the handle also resolves the shutdown
/// channel, so a handle that is discarded still winds the listener down.
#[derive(Debug)]
pub struct ServerHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn new(shutdown: oneshot::Sender<()>, task: JoinHandle<()>) -> Self {
        Self { shutdown, task }
    }

    /// Signal graceful shutdown and wait for the listener task to finish,
    /// aborting it if an in-flight connection holds it past the grace period.
    pub async fn shutdown(self) {
        let ServerHandle { shutdown, mut task } = self;
        let _ = shutdown.send(());
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
            task.abort();
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubmitRequest {
    signature: String,
}

/// Build the capture router over a shared session.
pub fn router(session: Arc<SignatureSession>) -> Router {
    Router::new()
        .route("/", get(sign_page))
        .route("/submit-signature", post(submit_signature))
        .with_state(session)
}

async fn sign_page() -> Html<&'static str> {
    Html(SIGN_PAGE)
}

/// Malformed JSON never reaches this handler: the `Json` extractor rejects it
/// with a client error before the session is touched.
async fn submit_signature(
    State(session): State<Arc<SignatureSession>>,
    Json(request): Json<SubmitRequest>,
) -> (StatusCode, &'static str) {
    tracing::info!(len = request.signature.len(), "signature submitted");
    session.submit(request.signature);
    (StatusCode::OK, "Signature received")
}

/// Bind the capture server and register it in the session.
///
/// Occupancy is checked before binding so a second start reports
/// `AlreadyRunning` rather than failing on the already-taken port. After a
/// successful start the signing page is opened in the local browser;
/// browser-launch failures are logged and swallowed.
pub async fn start(session: Arc<SignatureSession>, config: &ServerConfig) -> Result<(), ServeError> {
    if session.is_running() {
        return Err(ServeError::AlreadyRunning);
    }

    let addr = format!("127.0.0.1:{}", config.port);
    let listener =
        tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| ServeError::PortUnavailable {
                port: config.port,
                source: e,
            })?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let app = router(session.clone());
    let task = tokio::spawn(async move {
        let serve = axum::serve(listener, app).with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });
        if let Err(e) = serve.await {
            tracing::warn!("capture server exited with error: {e}");
        }
    });

    if session.start(ServerHandle::new(shutdown_tx, task)).is_err() {
        // Lost a start race; the dropped handle has already begun teardown.
        return Err(ServeError::AlreadyRunning);
    }

    let url = format!("http://localhost:{}", config.port);
    tracing::info!(port = config.port, "capture server listening at {url}");

    if config.open_browser {
        if let Err(e) = webbrowser::open(&url) {
            tracing::warn!("could not open browser at {url}: {e}");
        }
    }

    Ok(())
}

/// Release the session's server handle and shut the listener down.
pub async fn stop(session: &SignatureSession) -> Result<(), SessionError> {
    let handle = session.stop()?;
    handle.shutdown().await;
    tracing::info!("capture server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_session() -> Arc<SignatureSession> {
        Arc::new(SignatureSession::new())
    }

    /// Grab a port that is free right now. Small bind race with parallel
    /// tests, tolerable here.
    async fn free_port() -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    fn test_config(port: u16) -> ServerConfig {
        ServerConfig {
            port,
            open_browser: false,
        }
    }

    #[tokio::test]
    async fn test_sign_page_served_at_root() {
        let response = router(test_session())
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains("I want to proceed"));
        assert!(html.contains("/submit-signature"));
    }

    #[tokio::test]
    async fn test_submit_stores_signature() {
        let session = test_session();
        let response = router(session.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/submit-signature")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"signature":"0xabc"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"Signature received");
        assert_eq!(session.peek().as_deref(), Some("0xabc"));
    }

    #[tokio::test]
    async fn test_malformed_submission_does_not_touch_session() {
        let session = test_session();
        let response = router(session.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/submit-signature")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("not json at all"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.status().is_client_error());
        assert_eq!(session.peek(), None);
    }

    #[tokio::test]
    async fn test_missing_signature_field_is_client_error() {
        let session = test_session();
        let response = router(session.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/submit-signature")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"sig":"0xabc"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.status().is_client_error());
        assert_eq!(session.peek(), None);
    }

    #[tokio::test]
    async fn test_bind_conflict_is_port_unavailable() {
        // Hold the port so start() cannot bind it
        let blocker = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = blocker.local_addr().unwrap().port();

        let err = start(test_session(), &test_config(port))
            .await
            .unwrap_err();
        assert!(matches!(err, ServeError::PortUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_start_twice_is_already_running() {
        let session = test_session();
        let config = test_config(free_port().await);

        start(session.clone(), &config).await.unwrap();
        let err = start(session.clone(), &config).await.unwrap_err();
        assert!(matches!(err, ServeError::AlreadyRunning));

        // The first server is untouched by the failed second start
        assert!(session.is_running());
        stop(&session).await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_frees_port_for_restart() {
        let session = test_session();
        let config = test_config(free_port().await);

        start(session.clone(), &config).await.unwrap();
        stop(&session).await.unwrap();
        assert!(!session.is_running());

        start(session.clone(), &config).await.unwrap();
        stop(&session).await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_without_start_is_not_running() {
        let session = test_session();
        assert_eq!(stop(&session).await.unwrap_err(), SessionError::NotRunning);
    }

    #[tokio::test]
    async fn test_submission_over_the_wire() {
        let session = test_session();
        let port = free_port().await;
        start(session.clone(), &test_config(port)).await.unwrap();

        let response = reqwest::Client::new()
            .post(format!("http://127.0.0.1:{port}/submit-signature"))
            .json(&serde_json::json!({"signature": "0xfeed"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(session.peek().as_deref(), Some("0xfeed"));

        stop(&session).await.unwrap();
    }
}
