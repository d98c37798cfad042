use serde_json::Value;
use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use dualrag_core::traits::{Embedder, RemoteHealth};
use dualrag_core::types::RefreshOutcome;
use dualrag_core::Error;
use dualrag_vector::{IndexManager, RefreshScheduler};

use crate::protocol::{codes, parse_call, Call, ListAllResult, Method, Response, SearchParams, SearchResult};

/// Serves read-only operations against the index this process owns.
pub struct BridgeServer {
    manager: Arc<IndexManager>,
    embedder: Arc<dyn Embedder>,
    scheduler: RefreshScheduler,
}

impl BridgeServer {
    pub fn new(scheduler: RefreshScheduler, embedder: Arc<dyn Embedder>) -> Arc<Self> {
        Arc::new(Self { manager: scheduler.manager().clone(), embedder, scheduler })
    }

    /// Runs the first refresh to completion, then returns the server. A
    /// failed first refresh is logged and the server starts empty.
    pub async fn start(scheduler: RefreshScheduler, embedder: Arc<dyn Embedder>) -> Arc<Self> {
        let job = scheduler.refresh_now().await;
        match job.outcome {
            RefreshOutcome::Failed => warn!(
                index = %job.index,
                error = job.error.as_deref().unwrap_or("unknown"),
                "initial refresh failed, serving an empty index until the next refresh"
            ),
            outcome => info!(index = %job.index, ?outcome, documents = job.indexed_count, "initial refresh done"),
        }
        Self::new(scheduler, embedder)
    }

    pub fn scheduler(&self) -> &RefreshScheduler { &self.scheduler }

    /// Handle one frame. Always yields a response, including for garbage
    /// input and for handlers that fail or panic.
    pub async fn handle_line(self: &Arc<Self>, line: &str) -> Response {
        let call = match parse_call(line) {
            Ok(call) => call,
            Err(resp) => {
                warn!(code = resp.error.as_ref().map(|e| e.code.as_str()).unwrap_or_default(), "rejected bridge request");
                return resp;
            }
        };
        let Call { id, method, params } = call;
        debug!(id = %id, %method, "bridge request");

        let server = Arc::clone(self);
        let outcome = tokio::spawn(async move { server.dispatch(method, params).await }).await;
        match outcome {
            Ok(Ok(result)) => Response::success(id, result),
            Ok(Err(e)) => {
                let code = match &e {
                    Error::InvalidQuery(_) => codes::INVALID_PARAMS,
                    _ => codes::INTERNAL,
                };
                warn!(id = %id, %method, code, "bridge handler failed: {e}");
                Response::error(id, code, e.to_string())
            }
            Err(join_err) => {
                error!(id = %id, %method, "bridge handler panicked: {join_err}");
                Response::error(id, codes::INTERNAL, "handler failed unexpectedly")
            }
        }
    }

    async fn dispatch(&self, method: Method, params: Value) -> dualrag_core::Result<Value> {
        match method {
            Method::Search => self.search(params).await,
            Method::ListAll => self.list_all(),
            Method::Health => self.health(),
        }
    }

    async fn search(&self, params: Value) -> dualrag_core::Result<Value> {
        let params: SearchParams =
            serde_json::from_value(params).map_err(|e| Error::InvalidQuery(format!("invalid search params: {e}")))?;
        params.validate()?;
        let vector = self.embedder.embed(&params.query).await?;
        let mut results = self.manager.query(&vector, params.top_n, params.similarity_floor, &params.filters)?;
        for r in &mut results {
            r.document.vector.clear();
        }
        debug!(query = %params.query, hits = results.len(), "bridge search");
        encode(&SearchResult { results })
    }

    fn list_all(&self) -> dualrag_core::Result<Value> {
        let documents: Vec<_> = self.manager.snapshot().list_all().into_iter().map(|d| d.without_vector()).collect();
        encode(&ListAllResult { total: documents.len(), documents })
    }

    fn health(&self) -> dualrag_core::Result<Value> {
        encode(&RemoteHealth {
            index: self.manager.name().to_string(),
            documents: self.manager.len(),
            last_refresh: self.scheduler.last_job(),
        })
    }

    /// Serve one connection until the reader reaches EOF. Requests are handled
    /// concurrently; responses are written as they complete.
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, writer: W) -> io::Result<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<String>(64);
        let writer_task = tokio::spawn(async move {
            let mut writer = writer;
            while let Some(frame) = rx.recv().await {
                writer.write_all(frame.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
            Ok::<_, io::Error>(())
        });

        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf).trim().to_string();
            if line.is_empty() {
                continue;
            }
            let server = Arc::clone(&self);
            let tx = tx.clone();
            tokio::spawn(async move {
                let resp = server.handle_line(&line).await;
                match serde_json::to_string(&resp) {
                    Ok(frame) => {
                        if tx.send(frame).await.is_err() {
                            debug!("connection closed before response was written");
                        }
                    }
                    Err(e) => error!("failed to encode bridge response: {e}"),
                }
            });
        }
        drop(tx);
        debug!("bridge reader reached EOF");
        match writer_task.await {
            Ok(result) => result,
            Err(e) => Err(io::Error::new(io::ErrorKind::Other, e)),
        }
    }

    /// Accept TCP connections until `shutdown` resolves.
    pub async fn serve_tcp<F>(self: Arc<Self>, listener: TcpListener, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        info!(addr = %listener.local_addr()?, "bridge listening");
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("bridge shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!("accept failed: {e}");
                            continue;
                        }
                    };
                    info!(%peer, "bridge client connected");
                    let (reader, writer) = stream.into_split();
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = server.serve(reader, writer).await {
                            warn!(%peer, "bridge connection ended with error: {e}");
                        }
                        info!(%peer, "bridge client disconnected");
                    });
                }
            }
        }
    }
}

fn encode<T: serde::Serialize>(value: &T) -> dualrag_core::Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::protocol(codes::INTERNAL, format!("encode result: {e}")))
}
