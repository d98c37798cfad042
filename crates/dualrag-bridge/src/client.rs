use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use dualrag_core::filter::Filters;
use dualrag_core::traits::{RemoteHealth, RemoteSearch};
use dualrag_core::types::{Document, RetrievalResult, Source};
use dualrag_core::{Error, Result};

use crate::protocol::{codes, ListAllResult, Method, Request, Response, SearchResult};

#[derive(Default)]
struct Pending {
    waiters: HashMap<String, oneshot::Sender<Response>>,
    /// Set once the transport is gone; no new calls are accepted after that.
    closed: Option<String>,
}

impl Pending {
    /// Mark the transport dead. Dropping the senders wakes every waiter with a
    /// closed-channel error.
    fn close(&mut self, reason: String) {
        warn!("{reason}; failing in-flight calls");
        self.closed.get_or_insert(reason);
        self.waiters.clear();
    }
}

fn lock(p: &Mutex<Pending>) -> MutexGuard<'_, Pending> {
    p.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Frees a correlation entry however the call ends: reply, error, timeout or
/// the caller dropping the call future.
struct Waiter {
    pending: Arc<Mutex<Pending>>,
    id: String,
}

impl Drop for Waiter {
    fn drop(&mut self) {
        lock(&self.pending).waiters.remove(&self.id);
    }
}

/// Multiplexing client for a bridge server.
///
/// Each call gets a fresh correlation id; a background reader routes
/// responses back to their waiting call. Responses for ids nobody is waiting
/// on (typically calls that already timed out) are dropped. Frames go through
/// a single writer task, so a call that times out or is dropped never leaves
/// a partial frame on the transport.
pub struct BridgeClient {
    frames: mpsc::Sender<String>,
    pending: Arc<Mutex<Pending>>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
    _child: Option<Child>,
}

impl BridgeClient {
    pub fn from_io<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let pending = Arc::new(Mutex::new(Pending::default()));
        let (frames, rx) = mpsc::channel::<String>(64);
        let reader = tokio::spawn(read_responses(reader, Arc::clone(&pending)));
        let writer = tokio::spawn(write_frames(writer, rx, Arc::clone(&pending)));
        Self { frames, pending, reader, writer, _child: None }
    }

    pub async fn connect_tcp(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| Error::RemoteUnavailable(format!("connect {addr}: {e}")))?;
        info!(%addr, "connected to bridge over tcp");
        let (reader, writer) = stream.into_split();
        Ok(Self::from_io(reader, writer))
    }

    /// Spawn a bridge server as a child process and talk over its stdio. The
    /// child is killed when the client is dropped.
    pub fn spawn_process(command: &str, args: &[String]) -> Result<Self> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::RemoteUnavailable(format!("spawn {command}: {e}")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::RemoteUnavailable("bridge process has no stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::RemoteUnavailable("bridge process has no stdout".into()))?;
        info!(%command, pid = ?child.id(), "spawned bridge process");
        let mut client = Self::from_io(stdout, stdin);
        client._child = Some(child);
        Ok(client)
    }

    pub fn in_flight(&self) -> usize { lock(&self.pending).waiters.len() }

    pub fn is_closed(&self) -> bool { lock(&self.pending).closed.is_some() }

    /// Send one request and wait up to `timeout` for its response. No retry.
    pub async fn call(&self, method: Method, params: Value, timeout: Duration) -> Result<Value> {
        let id = Uuid::new_v4().to_string();
        let frame = serde_json::to_string(&Request { id: id.clone(), method: method.as_str().to_string(), params })
            .map_err(|e| Error::protocol("encode", e.to_string()))?;
        let (tx, rx) = oneshot::channel();
        let _waiter = {
            let mut pending = lock(&self.pending);
            if let Some(reason) = &pending.closed {
                return Err(Error::RemoteUnavailable(reason.clone()));
            }
            pending.waiters.insert(id.clone(), tx);
            Waiter { pending: Arc::clone(&self.pending), id: id.clone() }
        };

        let exchange = async {
            // a cancelled send enqueues nothing, so frames stay whole
            self.frames
                .send(frame)
                .await
                .map_err(|_| Error::RemoteUnavailable("bridge writer stopped".into()))?;
            rx.await
                .map_err(|_| Error::RemoteUnavailable("bridge connection closed".into()))?
                .into_result()
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                debug!(%id, %method, "bridge call timed out");
                Err(Error::RemoteTimeout { method: method.as_str().to_string(), timeout_ms: timeout.as_millis() as u64 })
            }
        }
    }
}

impl Drop for BridgeClient {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

async fn write_frames<W>(writer: W, mut frames: mpsc::Receiver<String>, pending: Arc<Mutex<Pending>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut writer = writer;
    while let Some(frame) = frames.recv().await {
        let written = async {
            writer.write_all(frame.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        };
        if let Err(e) = written.await {
            lock(&pending).close(format!("write to bridge: {e}"));
            return;
        }
    }
}

async fn read_responses<R>(reader: R, pending: Arc<Mutex<Pending>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let reason = loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break "bridge closed the connection".to_string(),
            Ok(_) => {}
            Err(e) => break format!("bridge read failed: {e}"),
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let resp: Response = match serde_json::from_str(line) {
            Ok(resp) => resp,
            Err(e) => {
                warn!("ignoring malformed bridge frame: {e}");
                continue;
            }
        };
        let key = match &resp.id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let waiter = lock(&pending).waiters.remove(&key);
        match waiter {
            Some(tx) => {
                let _ = tx.send(resp);
            }
            None => debug!(id = %key, "dropping response with no waiting call"),
        }
    };

    lock(&pending).close(reason);
}

#[async_trait]
impl RemoteSearch for BridgeClient {
    async fn search(
        &self,
        text: &str,
        top_n: usize,
        filters: &Filters,
        similarity_floor: f32,
        timeout: Duration,
    ) -> Result<Vec<RetrievalResult>> {
        let params = json!({
            "query": text,
            "top_n": top_n,
            "filters": filters,
            "similarity_floor": similarity_floor,
        });
        let value = self.call(Method::Search, params, timeout).await.map_err(|e| match e {
            // the caller's query is at fault, not the remote
            Error::Protocol { code, message } if code == codes::INVALID_PARAMS => Error::InvalidQuery(message),
            other => other,
        })?;
        let SearchResult { mut results } =
            serde_json::from_value(value).map_err(|e| Error::protocol("invalid_response", e.to_string()))?;
        for r in &mut results {
            r.source = Source::Remote;
        }
        Ok(results)
    }

    async fn list_all(&self, timeout: Duration) -> Result<Vec<Document>> {
        let value = self.call(Method::ListAll, json!({}), timeout).await?;
        let ListAllResult { documents, .. } =
            serde_json::from_value(value).map_err(|e| Error::protocol("invalid_response", e.to_string()))?;
        Ok(documents)
    }

    async fn health(&self, timeout: Duration) -> Result<RemoteHealth> {
        let value = self.call(Method::Health, json!({}), timeout).await?;
        serde_json::from_value(value).map_err(|e| Error::protocol("invalid_response", e.to_string()))
    }
}
