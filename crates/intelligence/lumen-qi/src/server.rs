//! Channel server and service loop
//!
//! The listener accepts TCP connections and forwards each request line to
//! the service loop over a bounded queue. The loop is the only place that
//! touches the service:
//!
//! ```text
//! conn ─┐
//! conn ─┼──► mpsc ──┐
//! conn ─┘           ├──► select! ──► spawn_blocking(handle) ──► reply
//!        interval ──┤              └► spawn_blocking(tick)
//!        shutdown ──┘
//! ```
//!
//! Each handler is awaited before the loop selects again, so commands and
//! background ticks run strictly one at a time.

use crate::config::ServiceConfig;
use crate::protocol::Response;
use crate::service::AdaptiveService;
use crate::{Error, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

/// A request line paired with where its reply goes
pub type Envelope = (String, oneshot::Sender<String>);

/// TCP listener speaking newline-delimited JSON
pub struct ChannelServer {
    listener: TcpListener,
    backoff: Duration,
}

impl ChannelServer {
    pub async fn bind(addr: &str, backoff: Duration) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Channel(format!("bind {}: {}", addr, e)))?;

        Ok(Self { listener, backoff })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` flips to true, then close the
    /// listener and wait for every connection to finish its current reply.
    pub async fn run(self, requests: mpsc::Sender<Envelope>, mut shutdown: watch::Receiver<bool>) {
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = stopped(&mut shutdown) => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!("Connection from {}", peer);
                        connections.spawn(serve_connection(
                            stream,
                            peer,
                            requests.clone(),
                            shutdown.clone(),
                        ));
                    }
                    Err(e) => {
                        tracing::error!("{}", Error::Channel(format!("accept failed: {}", e)));
                        tokio::time::sleep(self.backoff).await;
                    }
                },
                Some(finished) = connections.join_next() => {
                    if let Err(e) = finished {
                        tracing::error!("Connection task failed: {}", e);
                    }
                }
            }
        }

        drop(self.listener);
        drop(requests);

        while let Some(finished) = connections.join_next().await {
            if let Err(e) = finished {
                tracing::error!("Connection task failed: {}", e);
            }
        }
    }
}

/// Resolves once the flag is true, or once its sender is gone
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    requests: mpsc::Sender<Envelope>,
    shutdown: watch::Receiver<bool>,
) {
    if let Err(e) = exchange(stream, &requests, shutdown).await {
        tracing::warn!("Connection {} closed: {}", peer, e);
    } else {
        tracing::debug!("Connection {} closed", peer);
    }
}

/// One reply per request line, in order. Shutdown is only observed between
/// requests, so a reply in progress is always written.
async fn exchange(
    stream: TcpStream,
    requests: &mpsc::Sender<Envelope>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = tokio::select! {
            read = reader.read_until(b'\n', &mut buf) => read?,
            _ = stopped(&mut shutdown) => break,
        };
        if read == 0 {
            break;
        }

        let line = match String::from_utf8(std::mem::take(&mut buf)) {
            Ok(line) => line,
            Err(e) => {
                let err = Error::InvalidRequest(format!("request is not valid UTF-8: {}", e));
                tracing::warn!("{}", err);
                write_line(&mut writer, &Response::from_error(&err).encode()).await?;
                continue;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        requests
            .send((line.to_string(), reply_tx))
            .await
            .map_err(|_| Error::Channel("service loop stopped".into()))?;
        let reply = reply_rx
            .await
            .map_err(|_| Error::Channel("request dropped".into()))?;

        write_line(&mut writer, &reply).await?;
    }

    Ok(())
}

async fn write_line(writer: &mut OwnedWriteHalf, line: &str) -> Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Serializes commands and background ticks against one service
pub struct ServiceLoop {
    service: Arc<AdaptiveService>,
    bind: String,
    interval: Duration,
    backoff: Duration,
    queue: usize,
}

impl ServiceLoop {
    pub fn new(service: Arc<AdaptiveService>, config: &ServiceConfig) -> Self {
        Self {
            service,
            bind: config.bind.clone(),
            interval: config.optimize_interval(),
            backoff: config.channel_backoff(),
            queue: config.request_queue,
        }
    }

    /// Bind the configured address and serve until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let server = ChannelServer::bind(&self.bind, self.backoff).await?;
        tracing::info!("Listening on {}", server.local_addr()?);
        self.serve(server, shutdown).await
    }

    /// Serve an already-bound channel until `shutdown` resolves.
    ///
    /// A command already handed to the service completes and its reply is
    /// written; requests still queued are answered with an error. Returns
    /// once the listener is closed and every connection has ended.
    pub async fn serve<F>(self, server: ChannelServer, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let (tx, mut rx) = mpsc::channel::<Envelope>(self.queue);
        let (stop_tx, stop_rx) = watch::channel(false);
        let listener = tokio::spawn(server.run(tx, stop_rx));

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick fires immediately
        ticker.tick().await;

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested");
                    break;
                }
                Some((line, reply)) = rx.recv() => {
                    let service = self.service.clone();
                    let response = match tokio::task::spawn_blocking(move || service.handle_json(&line)).await {
                        Ok(response) => response,
                        Err(e) => {
                            tracing::error!("Handler task failed: {}", e);
                            Response::from_error(&Error::Channel(e.to_string())).encode()
                        }
                    };
                    if reply.send(response).is_err() {
                        tracing::debug!("Client went away before reply");
                    }
                }
                _ = ticker.tick() => {
                    let service = self.service.clone();
                    if let Err(e) = tokio::task::spawn_blocking(move || service.background_tick()).await {
                        tracing::error!("Background tick failed: {}", e);
                    }
                }
            }
        }

        let _ = stop_tx.send(true);

        rx.close();
        let refused = Response::from_error(&Error::Channel("service shutting down".into())).encode();
        while let Some((_, reply)) = rx.recv().await {
            let _ = reply.send(refused.clone());
        }

        if let Err(e) = listener.await {
            tracing::error!("Listener task failed: {}", e);
        }
        tracing::info!("Channel released");
        Ok(())
    }
}
