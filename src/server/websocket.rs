use crate::cli::Args;
use crate::models::chat::SessionSnapshot;
use crate::models::websocket::{ ClientMessage, ServerMessage };
use crate::session::ChatSession;
use crate::trainer::Trainer;

use std::error::Error;
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use tokio::io::{ AsyncRead, AsyncWrite };
use tokio::net::TcpListener;
use tokio::sync::{ mpsc, watch };
use tokio::task::JoinHandle;

use tokio_tungstenite::{ accept_hdr_async, WebSocketStream };
use tokio_tungstenite::tungstenite::handshake::server::{ ErrorResponse, Request, Response };
use tokio_tungstenite::tungstenite::http::{ Response as HttpResponse, StatusCode };
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_rustls::TlsAcceptor;

use rustls::ServerConfig;
use rustls::pki_types::{ CertificateDer, PrivateKeyDer };
use rustls_pemfile::{ certs, pkcs8_private_keys };

use lazy_static::lazy_static;
use governor::{ RateLimiter, Quota, state::{ InMemoryState, NotKeyed }, clock::DefaultClock };

use chrono::Utc;
use futures::{ SinkExt, StreamExt };
use log::{ debug, error, info, warn };
use url::form_urlencoded;

const MAX_MESSAGE_SIZE: usize = 1 * 1024 * 1024;
const OUTBOUND_BUFFER: usize = 32;

lazy_static! {
    static ref CONNECTION_LIMITER: RateLimiter<NotKeyed, InMemoryState, DefaultClock> =
        RateLimiter::direct(Quota::per_second(NonZeroU32::MIN.saturating_add(9)));
}

fn load_tls_config(
    cert_path: &str,
    key_path: &str
) -> Result<Arc<ServerConfig>, Box<dyn Error + Send + Sync>> {
    let cert_file = File::open(cert_path).map_err(|e|
        format!("Failed to open TLS certificate file '{}': {}", cert_path, e)
    )?;
    let key_file = File::open(key_path).map_err(|e|
        format!("Failed to open TLS key file '{}': {}", key_path, e)
    )?;

    let mut cert_reader = BufReader::new(cert_file);
    let mut key_reader = BufReader::new(key_file);
    let cert_chain: Vec<CertificateDer<'static>> = certs(&mut cert_reader)
        .collect::<Result<_, _>>()
        .map_err(|e| format!("Failed to read certificate(s): {}", e))?;

    let mut keys = pkcs8_private_keys(&mut key_reader);
    let key = match keys.next() {
        Some(Ok(k)) => PrivateKeyDer::Pkcs8(k),
        Some(Err(e)) => {
            return Err(format!("Error reading private key: {}", e).into());
        }
        None => {
            return Err("No PKCS8 private key found in key file".into());
        }
    };

    let config = ServerConfig::builder().with_no_client_auth().with_single_cert(cert_chain, key)?;
    Ok(Arc::new(config))
}

pub async fn start_ws_server(
    addr: &str,
    trainer: Arc<Trainer>,
    api_key: Option<String>,
    args: Args
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;

    let tls_acceptor = if args.enable_tls {
        match (&args.tls_cert_path, &args.tls_key_path) {
            (Some(cert_path), Some(key_path)) => {
                info!(
                    "TLS enabled. Loading certificate from '{}' and key from '{}'",
                    cert_path,
                    key_path
                );
                let config = load_tls_config(cert_path, key_path)?;
                Some(TlsAcceptor::from(config))
            }
            (Some(_), None) | (None, Some(_)) => {
                error!("Both --tls-cert-path and --tls-key-path must be provided to enable TLS.");
                return Err("Missing TLS certificate or key path".into());
            }
            (None, None) => {
                error!("--enable-tls was set but no certificate/key paths provided.");
                return Err("TLS enabled without cert/key".into());
            }
        }
    } else {
        info!("TLS not enabled. Running plain WebSocket (WS) server.");
        None
    };
    let protocol = if tls_acceptor.is_some() { "WSS" } else { "WS" };
    info!("{} server listening on: {}", protocol, addr);

    loop {
        let (stream, peer) = listener.accept().await?;

        if CONNECTION_LIMITER.check().is_err() {
            warn!("Global connection rate limit exceeded for {}. Dropping connection.", peer);
            continue;
        }

        info!("Incoming connection from: {}", peer);
        let trainer_clone = Arc::clone(&trainer);
        let required_api_key = api_key.clone();
        let tls_acceptor_clone = tls_acceptor.clone();

        tokio::spawn(async move {
            let process_result = if let Some(acceptor) = tls_acceptor_clone {
                match acceptor.accept(stream).await {
                    Ok(tls_stream) => {
                        info!("TLS handshake successful for {}", peer);
                        process_connection(peer, tls_stream, trainer_clone, required_api_key).await
                    }
                    Err(e) => {
                        error!("TLS handshake error for {}: {}", peer, e);
                        Err(Box::new(e) as Box<dyn Error + Send + Sync>)
                    }
                }
            } else {
                process_connection(peer, stream, trainer_clone, required_api_key).await
            };

            if let Err(e) = process_result {
                error!("Failed to process connection for {}: {}", peer, e);
            }
        });
    }
}

/// Accepts the key from the `X-API-Key` header or the `api_key` query parameter.
fn provided_api_key(req: &Request) -> Option<String> {
    req.headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .or_else(|| {
            req.uri()
                .query()
                .and_then(|q| {
                    form_urlencoded
                        ::parse(q.as_bytes())
                        .find(|(k, _)| k == "api_key")
                        .map(|(_, v)| v.into_owned())
                })
        })
}

fn is_authorized(req: &Request, required: Option<&str>) -> bool {
    match required {
        Some(required) => provided_api_key(req).as_deref() == Some(required),
        None => true,
    }
}

fn unauthorized() -> ErrorResponse {
    let mut resp = HttpResponse::new(Some("Unauthorized".to_string()));
    *resp.status_mut() = StatusCode::UNAUTHORIZED;
    resp
}

async fn process_connection<S>(
    peer: SocketAddr,
    stream: S,
    trainer: Arc<Trainer>,
    required_api_key: Option<String>
) -> Result<(), Box<dyn Error + Send + Sync>>
    where S: AsyncRead + AsyncWrite + Unpin + Send + 'static
{
    let auth_callback = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        debug!("Handshake from {} for {}", peer, req.uri().path());
        if !is_authorized(req, required_api_key.as_deref()) {
            warn!("{}: bad or missing API key", peer);
            return Err(unauthorized());
        }
        Ok(response)
    };

    match accept_hdr_async(stream, auth_callback).await {
        Ok(ws) => {
            handle_connection(peer, ws, trainer).await;
            Ok(())
        }
        Err(e) => {
            error!("Handshake failed for {}: {}", peer, e);
            Err(Box::new(e) as _)
        }
    }
}

fn encode(msg: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(msg) {
        Ok(json) => Some(Message::Text(json)),
        Err(e) => {
            error!("Failed to serialize server message: {}", e);
            None
        }
    }
}

async fn send_to(out: &mpsc::Sender<Message>, msg: ServerMessage) -> bool {
    match encode(&msg) {
        Some(frame) => out.send(frame).await.is_ok(),
        None => true,
    }
}

/// Pushes every transcript snapshot of a session to the client.
fn spawn_transcript_forwarder(
    mut updates: watch::Receiver<SessionSnapshot>,
    out: mpsc::Sender<Message>
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let snapshot = updates.borrow_and_update().clone();
            if !send_to(&out, ServerMessage::Transcript { snapshot }).await {
                break;
            }
            if updates.changed().await.is_err() {
                break;
            }
        }
    })
}

struct ConnectionState {
    session: Option<ChatSession>,
    forwarder: Option<JoinHandle<()>>,
}

impl ConnectionState {
    fn stop_forwarding(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }

    fn replace_session(&mut self, session: ChatSession, out: &mpsc::Sender<Message>) {
        self.stop_forwarding();
        self.forwarder = Some(spawn_transcript_forwarder(session.subscribe(), out.clone()));
        self.session = Some(session);
    }
}

impl Drop for ConnectionState {
    fn drop(&mut self) {
        self.stop_forwarding();
    }
}

async fn handle_client_message(
    peer: SocketAddr,
    message: ClientMessage,
    state: &mut ConnectionState,
    trainer: &Trainer,
    out: &mpsc::Sender<Message>
) -> bool {
    match message {
        ClientMessage::Start { scenario_id } => {
            match trainer.start_session(&scenario_id).await {
                Ok(session) => {
                    info!("{} started session {} ({})", peer, session.id(), scenario_id);
                    state.replace_session(session, out);
                    true
                }
                Err(e) => send_to(out, ServerMessage::Error { message: e.to_string() }).await,
            }
        }
        ClientMessage::Chat { content } => {
            let session = match state.session.as_mut() {
                Some(session) => session,
                None => {
                    return send_to(out, ServerMessage::Error {
                        message: "No active session. Send a start message first.".to_string(),
                    }).await;
                }
            };
            match session.send_message(&content).await {
                Ok(_) => true,
                Err(e) => send_to(out, ServerMessage::Error { message: e.to_string() }).await,
            }
        }
        ClientMessage::Complete => {
            let session = match state.session.as_mut() {
                Some(session) => session,
                None => {
                    return send_to(out, ServerMessage::Error {
                        message: "No active session to complete.".to_string(),
                    }).await;
                }
            };
            if !send_to(out, ServerMessage::Processing).await {
                return false;
            }
            match trainer.complete_session(session).await {
                Ok(outcome) => {
                    // the frozen transcript goes out ahead of the review
                    let snapshot = session.snapshot();
                    state.stop_forwarding();
                    send_to(out, ServerMessage::Transcript { snapshot }).await &&
                        send_to(out, ServerMessage::Review {
                            review: outcome.review,
                            skill_gained: outcome.skill_gained,
                            skill_rating: outcome.new_skill_rating,
                            unlocked: outcome.unlocked,
                            timestamp: Utc::now().timestamp(),
                        }).await
                }
                Err(e) => {
                    error!("Completion failed for {}: {}", peer, e);
                    send_to(out, ServerMessage::Error { message: e.to_string() }).await
                }
            }
        }
    }
}

pub async fn handle_connection<S>(peer: SocketAddr, websocket: WebSocketStream<S>, trainer: Arc<Trainer>)
    where S: AsyncRead + AsyncWrite + Unpin + Send + 'static
{
    info!("New WebSocket connection: {}", peer);
    let (mut sink, mut rx) = websocket.split();
    let (out, mut outbound) = mpsc::channel::<Message>(OUTBOUND_BUFFER);

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if let Err(e) = sink.send(frame).await {
                error!("Error sending message to {}: {}", peer, e);
                break;
            }
        }
    });

    let mut state = ConnectionState { session: None, forwarder: None };

    while let Some(msg) = rx.next().await {
        let message = match msg {
            Ok(message) => message,
            Err(e) => {
                match e {
                    | tokio_tungstenite::tungstenite::Error::ConnectionClosed
                    | tokio_tungstenite::tungstenite::Error::Protocol(_)
                    | tokio_tungstenite::tungstenite::Error::Utf8 => {
                        info!("WebSocket connection closed or protocol error for {}: {}", peer, e);
                    }
                    tokio_tungstenite::tungstenite::Error::Io(ref io_err) if
                        io_err.kind() == std::io::ErrorKind::ConnectionReset
                    => {
                        info!("WebSocket connection reset by peer {}", peer);
                    }
                    _ => {
                        error!("Error receiving message from {}: {}", peer, e);
                    }
                }
                break;
            }
        };

        if message.len() > MAX_MESSAGE_SIZE {
            warn!(
                "Message from {} exceeds size limit ({} > {})",
                peer,
                message.len(),
                MAX_MESSAGE_SIZE
            );
            send_to(&out, ServerMessage::Error { message: "Message too large".to_string() }).await;
            break;
        }

        let keep_going = match message {
            Message::Text(text) =>
                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(client_msg) =>
                        handle_client_message(peer, client_msg, &mut state, &trainer, &out).await,
                    Err(e) => {
                        error!("Failed to parse message from {}: {}", peer, e);
                        send_to(&out, ServerMessage::Error {
                            message: format!("Failed to parse message: {}", e),
                        }).await
                    }
                }
            Message::Close(_) => {
                info!("Received close frame from {}", peer);
                false
            }
            Message::Ping(ping_data) => out.send(Message::Pong(ping_data)).await.is_ok(),
            Message::Pong(_) => true,
            Message::Binary(_) => {
                warn!("Ignoring binary message from {}", peer);
                true
            }
            Message::Frame(_) => true,
        };

        if !keep_going {
            break;
        }
    }

    drop(state);
    drop(out);
    if let Err(e) = writer.await {
        error!("Writer task for {} ended abnormally: {}", peer, e);
    }
    info!("WebSocket connection closed for {}", peer);
}
