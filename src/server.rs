//! Accepts chat clients and relays every line to all of them.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::ScriptError;
use crate::node::{MessageTransform, Node};
use crate::peer::Connection;
use crate::router::BroadcastRouter;
use crate::sifosc;

pub struct Server {
    node: Node,
    router: Arc<BroadcastRouter>,
    shutdown: CancellationToken,
    local_addr: Option<SocketAddr>,
    accept_task: Option<JoinHandle<()>>,
}

impl Server {
    /// A server that stamps each line with the time and the sender's name.
    pub fn new(name: impl Into<String>) -> Server {
        Server::with_transform(name, MessageTransform::Stamp)
    }

    pub fn with_transform(name: impl Into<String>, transform: MessageTransform) -> Server {
        let node = Node::server(name, transform);
        let router = match node.router() {
            Some(router) => Arc::clone(router),
            None => BroadcastRouter::new(),
        };
        Server {
            node,
            router,
            shutdown: CancellationToken::new(),
            local_addr: None,
            accept_task: None,
        }
    }

    /// A server that evaluates each line as a SIFOSC formula. Fails if the interpreter does
    /// not pass its self-check.
    pub fn sifosc(name: impl Into<String>) -> Result<Server, ScriptError> {
        sifosc::self_check()?;
        Ok(Server::with_transform(name, MessageTransform::Sifosc))
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn router(&self) -> &Arc<BroadcastRouter> {
        &self.router
    }

    /// Address the listener is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Binds `addr` and starts accepting clients in the background. Port 0 picks a free port;
    /// the bound address is returned.
    pub async fn start<A: ToSocketAddrs>(&mut self, addr: A) -> io::Result<SocketAddr> {
        if let Some(addr) = self.local_addr {
            warn!(%addr, "server is already listening");
            return Ok(addr);
        }

        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!(
            name = self.node.name(),
            %local_addr,
            family = if local_addr.is_ipv4() { "IPv4" } else { "IPv6" },
            "server listening"
        );

        self.local_addr = Some(local_addr);
        self.accept_task = Some(tokio::spawn(accept_loop(
            listener,
            self.node.clone(),
            self.shutdown.clone(),
        )));
        Ok(local_addr)
    }

    /// Stops accepting and closes every flow. Returns once all of them are gone.
    pub async fn stop(&mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.accept_task.take() {
            if let Err(err) = task.await {
                error!(%err, "accept loop did not finish cleanly");
            }
            info!(name = self.node.name(), "server stopped");
        }
    }

    /// Resolves when the server has been told to stop.
    pub async fn stopped(&self) {
        self.shutdown.cancelled().await
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn accept_loop(listener: TcpListener, node: Node, shutdown: CancellationToken) {
    let mut flows = JoinSet::new();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "accepted connection");
                    flows.spawn(serve(node.clone(), stream, shutdown.child_token()));
                }
                Err(err) => warn!(%err, "failed to accept connection"),
            },
            Some(finished) = flows.join_next(), if !flows.is_empty() => {
                if let Err(err) = finished {
                    error!(%err, "flow task panicked");
                }
            }
        }
    }

    // Every flow holds a child token, so they are all winding down already.
    while let Some(finished) = flows.join_next().await {
        if let Err(err) = finished {
            error!(%err, "flow task panicked");
        }
    }
}

async fn serve(node: Node, stream: TcpStream, cancel: CancellationToken) {
    if let Err(err) = Connection::tcp(node, stream, cancel).run().await {
        warn!(%err, "flow ended with an error");
    }
}
