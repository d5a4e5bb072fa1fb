//! Defines IO with a chat peer.
//!
//! A [`Connection`] owns a freshly accepted or connected stream. Running it turns the stream
//! into a [`CommunicationFlow`], which validates the peer, exchanges names and then pumps
//! lines in both directions until either direction stops.
//!
//! ```text
//! Created --run--> Handshaking --ok--> Active --loop ends / close--> Closed
//!                       |                                              ^
//!                       +------------------- failure ------------------+
//! ```

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::FlowError;
use crate::handshake::{exchange_names, exchange_signature, SIGNATURE};
use crate::message::{self, FrameReader, FrameWriter};
use crate::node::{Node, Outbox};

pub type FlowId = u64;

static NEXT_FLOW_ID: AtomicU64 = AtomicU64::new(1);

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Created = 0,
    Handshaking = 1,
    Active = 2,
    Closed = 3,
}

impl FlowState {
    fn from_u8(raw: u8) -> FlowState {
        match raw {
            0 => FlowState::Created,
            1 => FlowState::Handshaking,
            2 => FlowState::Active,
            _ => FlowState::Closed,
        }
    }
}

#[derive(Debug)]
struct FlowShared {
    state: AtomicU8,
    cancel: CancellationToken,
}

impl FlowShared {
    fn state(&self) -> FlowState {
        FlowState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: FlowState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn transition(&self, from: FlowState, to: FlowState) -> Result<(), FlowState> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(FlowState::from_u8)
    }
}

/// Cloneable remote control for a flow, usable from any task or thread.
#[derive(Debug, Clone)]
pub struct FlowHandle {
    id: FlowId,
    shared: Arc<FlowShared>,
}

impl FlowHandle {
    pub fn id(&self) -> FlowId {
        self.id
    }

    pub fn state(&self) -> FlowState {
        self.shared.state()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == FlowState::Closed
    }

    /// Asks the flow to stop. Both loops notice promptly; calling this again is harmless.
    pub fn close(&self) {
        // A flow that never ran goes straight to Closed; a running one closes itself.
        let _ = self
            .shared
            .transition(FlowState::Created, FlowState::Closed);
        self.shared.cancel.cancel();
    }
}

/// One validated, named, two-way session on top of a byte stream.
pub struct CommunicationFlow<S> {
    id: FlowId,
    node: Node,
    reader: Option<FrameReader<ReadHalf<S>>>,
    writer: Option<FrameWriter<WriteHalf<S>>>,
    validated: bool,
    local_name: Option<String>,
    remote_name: Option<String>,
    shared: Arc<FlowShared>,
}

impl<S> CommunicationFlow<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    /// Wraps `stream`. The flow stops when `cancel` fires, which lets an owner close many
    /// flows at once through a parent token.
    pub fn new(node: Node, stream: S, cancel: CancellationToken) -> CommunicationFlow<S> {
        let (reader, writer) = message::split(stream);
        CommunicationFlow {
            id: NEXT_FLOW_ID.fetch_add(1, Ordering::Relaxed),
            node,
            reader: Some(reader),
            writer: Some(writer),
            validated: false,
            local_name: None,
            remote_name: None,
            shared: Arc::new(FlowShared {
                state: AtomicU8::new(FlowState::Created as u8),
                cancel,
            }),
        }
    }

    pub fn id(&self) -> FlowId {
        self.id
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn state(&self) -> FlowState {
        self.shared.state()
    }

    pub fn is_validated(&self) -> bool {
        self.validated
    }

    pub fn is_disposed(&self) -> bool {
        self.writer.is_none()
    }

    pub fn local_name(&self) -> Option<&str> {
        self.local_name.as_deref()
    }

    pub fn remote_name(&self) -> Option<&str> {
        self.remote_name.as_deref()
    }

    pub fn handle(&self) -> FlowHandle {
        FlowHandle {
            id: self.id,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Handshakes, then runs the send and receive loops until one of them stops. The stream
    /// is released before this returns, whatever the outcome.
    pub async fn run(&mut self) -> Result<(), FlowError> {
        if let Err(current) = self
            .shared
            .transition(FlowState::Created, FlowState::Handshaking)
        {
            return Err(match current {
                FlowState::Closed => FlowError::Disposed,
                _ => FlowError::AlreadyStarted,
            });
        }

        let result = self.drive().await;
        self.close().await;
        result
    }

    async fn drive(&mut self) -> Result<(), FlowError> {
        let id = self.id;
        let cancel = self.shared.cancel.clone();

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(flow = id, "closed during handshake");
                return Ok(());
            }
            handshake = self.handshake() => handshake?,
        }
        self.shared.set_state(FlowState::Active);

        let mut outbox = self.node.open_outbound(id)?;
        let (Some(reader), Some(writer)) = (self.reader.as_mut(), self.writer.as_mut()) else {
            return Err(FlowError::Disposed);
        };
        let node = &self.node;
        let remote = self.remote_name.as_deref().unwrap_or_default();

        // Whichever side finishes first wins; the other loop is dropped mid-await.
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(flow = id, "close requested");
                Ok(())
            }
            sent = send_loop(writer, &mut outbox) => sent,
            received = receive_loop(reader, node, remote) => received,
        }
    }

    /// Validates the peer and exchanges display names. Does nothing once both are done.
    pub async fn handshake(&mut self) -> Result<(), FlowError> {
        if self.validated && self.remote_name.is_some() {
            return Ok(());
        }
        let (Some(reader), Some(writer)) = (self.reader.as_mut(), self.writer.as_mut()) else {
            return Err(FlowError::Disposed);
        };

        if !self.validated {
            if let Err(err) = exchange_signature(reader, writer, &SIGNATURE).await {
                warn!(flow = self.id, %err, "peer failed validation");
                return Err(err);
            }
            self.validated = true;
        }

        let local = self.node.name().to_owned();
        let remote = exchange_names(reader, writer, &local).await?;
        info!(flow = self.id, local = %local, remote = %remote, "flow established");
        self.local_name = Some(local);
        self.remote_name = Some(remote);
        Ok(())
    }

    /// Stops both loops and releases the stream. Safe to call more than once.
    pub async fn close(&mut self) {
        self.shared.cancel.cancel();
        self.shared.set_state(FlowState::Closed);
        self.reader.take();
        if let Some(mut writer) = self.writer.take() {
            if let Err(err) = writer.shutdown().await {
                debug!(flow = self.id, %err, "stream was already gone");
            }
            info!(flow = self.id, "flow closed");
        }
    }
}

impl<S> Drop for CommunicationFlow<S> {
    fn drop(&mut self) {
        // The halves close the stream as they drop; only the shared state is left to settle.
        self.shared.set_state(FlowState::Closed);
        self.shared.cancel.cancel();
    }
}

async fn send_loop<W>(writer: &mut FrameWriter<W>, outbox: &mut Outbox) -> Result<(), FlowError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = outbox.next().await {
        // An empty frame would make the peer drop the stream.
        if line.is_empty() {
            continue;
        }
        writer.send_text(&line).await?;
    }
    debug!("nothing left to send");
    Ok(())
}

async fn receive_loop<R>(
    reader: &mut FrameReader<R>,
    node: &Node,
    remote: &str,
) -> Result<(), FlowError>
where
    R: AsyncRead + Unpin,
{
    loop {
        if !reader.wait_for_data().await? {
            debug!(remote, "peer closed the stream");
            return Ok(());
        }
        let text = reader.receive_text().await;
        if text.is_empty() {
            // The reader already reported why.
            return Ok(());
        }
        node.consume_inbound(remote, &text);
    }
}

/// A transport session bound to the node that accepted or initiated it.
pub struct Connection<S> {
    node: Node,
    stream: Option<S>,
    cancel: CancellationToken,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    pub fn new(node: Node, stream: S, cancel: CancellationToken) -> Connection<S> {
        Connection {
            node,
            stream: Some(stream),
            cancel,
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.stream.is_none()
    }

    /// Drops the stream without ever running a flow on it.
    pub fn dispose(&mut self) {
        if self.stream.take().is_some() {
            debug!("connection disposed before its flow started");
        }
    }

    pub fn into_flow(mut self) -> Result<CommunicationFlow<S>, FlowError> {
        let stream = self.stream.take().ok_or(FlowError::Disposed)?;
        Ok(CommunicationFlow::new(self.node, stream, self.cancel))
    }

    /// Runs the whole lifecycle: handshake, message exchange, release.
    pub async fn run(self) -> Result<(), FlowError> {
        let mut flow = self.into_flow()?;
        flow.run().await
    }
}

impl Connection<TcpStream> {
    /// Wraps a TCP stream, logging both of its endpoints.
    pub fn tcp(node: Node, stream: TcpStream, cancel: CancellationToken) -> Connection<TcpStream> {
        info!(
            local = %describe(stream.local_addr()),
            remote = %describe(stream.peer_addr()),
            "connection established"
        );
        Connection::new(node, stream, cancel)
    }
}

fn describe(addr: io::Result<SocketAddr>) -> String {
    match addr {
        Ok(addr) => format!("{} ({})", addr, if addr.is_ipv4() { "IPv4" } else { "IPv6" }),
        Err(err) => format!("unknown ({})", err),
    }
}
