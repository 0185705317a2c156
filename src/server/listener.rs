use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::BytesMut;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::info;
use url::Url;

use crate::config::{Config, ProxyConfig};
use crate::http::client::HttpClient;
use crate::http::connection::{ConnectionId, ConnectionStatus, Protocol, ServerConnection, ServerHandler};
use crate::http::reply::Reply;
use crate::http::writer::OutputWriter;
use crate::proxy::upstream::error_reply;
use crate::proxy::{Proxy, ProxyManager};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Requests under the proxy prefix, relayed upstream.
pub struct ProxyRoute {
    config: ProxyConfig,
    upstream: Url,
    client: HttpClient,
    manager: Mutex<ProxyManager>,
}

impl ProxyRoute {
    pub fn new(config: ProxyConfig) -> Result<Self> {
        let upstream = Url::parse(&config.upstream)
            .with_context(|| format!("Invalid upstream URL {}", config.upstream))?;
        let client = HttpClient::new(
            Duration::from_secs(config.connect_timeout_secs),
            Duration::from_secs(config.request_timeout_secs),
        );
        Ok(Self {
            config,
            upstream,
            client,
            manager: Mutex::new(ProxyManager::new()),
        })
    }

    pub fn matches(&self, path: &str) -> bool {
        self.config.matches(path)
    }

    /// Relays the pending request of `conn` and returns the reply to send.
    pub async fn forward(&self, conn: &ServerConnection) -> Reply {
        let proxy = match Proxy::new(
            conn.id(),
            &self.upstream,
            &self.config.prefix,
            conn.request(),
            self.client.clone(),
        ) {
            Ok(proxy) => proxy,
            Err(e) => {
                tracing::error!(conn = conn.id(), error = %e, "Cannot build upstream request");
                return error_reply(&e);
            }
        };

        if !self.manager.lock().await.add(proxy.clone()) {
            return error_reply(&anyhow::anyhow!("proxy already in flight"));
        }
        let reply = proxy.execute().await;
        self.manager.lock().await.remove(conn.id());
        reply
    }

    pub async fn in_flight(&self) -> usize {
        self.manager.lock().await.len()
    }
}

/// Sends proxied paths upstream and everything else to the application
/// handler.
struct Router<H> {
    handler: Arc<H>,
    proxy: Option<Arc<ProxyRoute>>,
}

impl<H: ServerHandler> ServerHandler for Router<H> {
    fn on_request(&self, conn: &mut ServerConnection) {
        if let Some(proxy) = &self.proxy {
            if proxy.matches(conn.request().path()) {
                // Answered asynchronously by the connection task.
                return;
            }
        }
        self.handler.on_request(conn);
    }

    fn on_web_socket(&self, conn: &mut ServerConnection) {
        self.handler.on_web_socket(conn);
    }
}

#[derive(Clone, Copy)]
struct Settings {
    idle_timeout: Duration,
    close_connection: bool,
    max_body_bytes: usize,
    max_message_bytes: usize,
}

/// Accepts connections on the configured address until an accept fails.
pub async fn run<H>(cfg: &Config, handler: Arc<H>) -> Result<()>
where
    H: ServerHandler + Send + Sync + 'static,
{
    let listener = TcpListener::bind(&cfg.server.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.server.listen_addr))?;
    info!("Listening on {}", cfg.server.listen_addr);
    serve(listener, cfg, handler).await
}

/// Accept loop over an already bound listener.
pub async fn serve<H>(listener: TcpListener, cfg: &Config, handler: Arc<H>) -> Result<()>
where
    H: ServerHandler + Send + Sync + 'static,
{
    let proxy = match &cfg.proxy {
        Some(proxy_cfg) => {
            info!(prefix = %proxy_cfg.prefix, upstream = %proxy_cfg.upstream, "Proxy route enabled");
            Some(Arc::new(ProxyRoute::new(proxy_cfg.clone())?))
        }
        None => None,
    };
    let settings = Settings {
        idle_timeout: cfg.server.timeout(),
        close_connection: cfg.server.close_connection,
        max_body_bytes: cfg.server.max_body_bytes,
        max_message_bytes: cfg.server.max_message_bytes,
    };

    loop {
        let (socket, peer) = listener.accept().await?;
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        info!(conn = id, %peer, "Accepted connection");

        let router = Router {
            handler: Arc::clone(&handler),
            proxy: proxy.clone(),
        };
        tokio::spawn(async move {
            if let Err(e) = drive(socket, peer, id, router, settings).await {
                tracing::error!(conn = id, %peer, "Connection error: {}", e);
            }
        });
    }
}

async fn drive<H: ServerHandler>(
    mut socket: TcpStream,
    peer: SocketAddr,
    id: ConnectionId,
    router: Router<H>,
    settings: Settings,
) -> Result<()> {
    let mut conn = ServerConnection::new(id);
    conn.set_close_connection(settings.close_connection);
    conn.set_max_content_length(settings.max_body_bytes);
    conn.set_max_message_size(settings.max_message_bytes);
    let mut buf = BytesMut::with_capacity(conn.recv_buffer_size());

    loop {
        if conn.status() == ConnectionStatus::RequestOk && conn.protocol() == Protocol::Http {
            if let Some(proxy) = &router.proxy {
                if proxy.matches(conn.request().path()) {
                    let reply = proxy.forward(&conn).await;
                    conn.relay_reply(reply);
                }
            }
        }

        if conn.has_output() {
            let mut writer = OutputWriter::new(conn.take_output());
            writer.write_to_stream(&mut socket).await?;
            conn.on_reply_sent();
            if conn.is_closed() {
                break;
            }
            conn.parse_input(&router);
            continue;
        }

        if conn.is_closed() {
            break;
        }

        buf.clear();
        buf.reserve(conn.recv_buffer_size());
        match timeout(settings.idle_timeout, socket.read_buf(&mut buf)).await {
            Err(_) => {
                tracing::debug!(conn = id, %peer, status = ?conn.status(), "Idle timeout");
                if conn.handle_timeout() && !conn.has_output() {
                    break;
                }
            }
            Ok(Ok(0)) => {
                tracing::debug!(conn = id, %peer, "Peer closed connection");
                break;
            }
            Ok(Ok(n)) => conn.handle_readable(&buf[..n], &router),
            Ok(Err(e)) => return Err(e.into()),
        }
    }

    info!(conn = id, %peer, "Connection closed");
    Ok(())
}
