//! Wake event listener
//!
//! Speaks the subset of the Wyoming protocol a satellite needs: each event is
//! a newline-terminated JSON header, optionally followed by `data_length`
//! bytes of JSON data and `payload_length` bytes of binary payload. A
//! `run-pipeline` event starts a turn; every other event is read and ignored.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::net::TcpListener;

use crate::turn::{TurnError, TurnOrchestrator};
use crate::{Error, Result};

/// Event type that triggers a turn
pub const RUN_PIPELINE: &str = "run-pipeline";

/// Largest header line accepted, newline included
const MAX_HEADER_LENGTH: u64 = 64 * 1024;

/// Largest `data` section accepted
const MAX_DATA_LENGTH: usize = 1024 * 1024;

/// One event header, with its data section merged in
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventHeader {
    /// Event type, e.g. `run-pipeline` or `audio-chunk`
    #[serde(rename = "type")]
    pub kind: String,

    /// Event data
    #[serde(default)]
    pub data: Option<Value>,

    /// Bytes of JSON data following the header
    #[serde(default)]
    pub data_length: Option<usize>,

    /// Bytes of binary payload following the data
    #[serde(default)]
    pub payload_length: Option<u64>,
}

/// Extract the socket address from a `tcp://host:port` URI
///
/// # Errors
///
/// Returns `Error::Config` for any other scheme or a missing address
pub fn parse_uri(uri: &str) -> Result<&str> {
    let addr = uri
        .strip_prefix("tcp://")
        .ok_or_else(|| {
            Error::Config(format!(
                "unsupported listener URI {uri:?} (expected tcp://host:port)"
            ))
        })?;

    if addr.is_empty() || !addr.contains(':') {
        return Err(Error::Config(format!("listener URI {uri:?} needs host:port")));
    }

    Ok(addr)
}

/// Read the next event, skipping its payload
///
/// Returns `None` at end of stream. Blank lines between events are ignored.
///
/// # Errors
///
/// Returns error if the header is not valid JSON or the stream ends inside
/// an event
pub async fn read_event<R>(reader: &mut R) -> Result<Option<EventHeader>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let mut header: EventHeader = loop {
        line.clear();
        let read = (&mut *reader)
            .take(MAX_HEADER_LENGTH)
            .read_line(&mut line)
            .await?;
        if read == 0 {
            return Ok(None);
        }
        if !line.ends_with('\n') && read as u64 >= MAX_HEADER_LENGTH {
            return Err(Error::Listener(format!("event header exceeds {MAX_HEADER_LENGTH} bytes")));
        }
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            break serde_json::from_str(trimmed)?;
        }
    };

    if let Some(len) = header.data_length.filter(|&len| len > 0) {
        if len > MAX_DATA_LENGTH {
            return Err(Error::Listener(format!("event data too large ({len} bytes)")));
        }
        let mut data = vec![0; len];
        reader.read_exact(&mut data).await?;
        let extra: Value = serde_json::from_slice(&data)?;
        header.data = Some(merge_data(header.data.take(), extra));
    }

    if let Some(len) = header.payload_length.filter(|&len| len > 0) {
        let skipped = tokio::io::copy(&mut (&mut *reader).take(len), &mut tokio::io::sink()).await?;
        if skipped != len {
            return Err(Error::Listener(format!(
                "stream ended inside payload ({skipped} of {len} bytes)"
            )));
        }
    }

    Ok(Some(header))
}

fn merge_data(inline: Option<Value>, extra: Value) -> Value {
    match (inline, extra) {
        (Some(Value::Object(mut base)), Value::Object(more)) => {
            base.extend(more);
            Value::Object(base)
        }
        (_, extra) => extra,
    }
}

/// Accepts Wyoming clients and turns wake events into turns
pub struct WakeListener {
    listener: TcpListener,
    orchestrator: Arc<TurnOrchestrator>,
}

impl WakeListener {
    /// Bind to `uri` (`tcp://host:port`)
    ///
    /// # Errors
    ///
    /// Returns error if the URI is malformed or the address cannot be bound
    pub async fn bind(uri: &str, orchestrator: Arc<TurnOrchestrator>) -> Result<Self> {
        let addr = parse_uri(uri)?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Listener(format!("failed to bind {addr}: {e}")))?;

        Ok(Self {
            listener,
            orchestrator,
        })
    }

    /// Address actually bound (useful with port 0)
    ///
    /// # Errors
    ///
    /// Returns error if the socket has no local address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` resolves
    ///
    /// # Errors
    ///
    /// Returns error only if the bound address cannot be read; accept
    /// failures are logged and retried
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(addr = %self.local_addr()?, "wake listener ready");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("wake listener shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!(%peer, "client connected");
                        let orchestrator = Arc::clone(&self.orchestrator);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, orchestrator).await {
                                tracing::warn!(%peer, error = %e, "connection dropped");
                            }
                            tracing::debug!(%peer, "client disconnected");
                        });
                    }
                    Err(e) => tracing::warn!(error = %e, "accept failed"),
                },
            }
        }
    }
}

/// Read events from one client until it disconnects
///
/// Turns run on their own task so the connection keeps draining events and
/// the overlap policy decides what happens to wake events mid-turn.
///
/// # Errors
///
/// Returns error on a malformed event or a read failure
pub async fn handle_connection<S>(stream: S, orchestrator: Arc<TurnOrchestrator>) -> Result<()>
where
    S: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);

    while let Some(event) = read_event(&mut reader).await? {
        if event.kind == RUN_PIPELINE {
            start_turn(Arc::clone(&orchestrator));
        } else {
            tracing::trace!(kind = %event.kind, "ignoring event");
        }
    }

    Ok(())
}

fn start_turn(orchestrator: Arc<TurnOrchestrator>) {
    tokio::spawn(async move {
        match orchestrator.handle_wake_word().await {
            Ok(outcome) => {
                tracing::info!(
                    turn_id = %outcome.id,
                    response = %outcome.response,
                    "turn finished"
                );
            }
            // Already logged at admission
            Err(TurnError::Busy) => {}
            Err(e) => tracing::debug!(stage = ?e.stage(), "turn ended without an answer"),
        }
    });
}
