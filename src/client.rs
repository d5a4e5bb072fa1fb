//! Connects to a chat server and bridges it with a local console.

use tokio::net::TcpStream;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::FlowError;
use crate::node::Node;
use crate::peer::Connection;

pub struct Client {
    node: Node,
}

impl Client {
    /// `input` yields the lines to send; every received line is pushed into `output` as
    /// `<server>text`.
    pub fn new(
        name: impl Into<String>,
        input: UnboundedReceiver<String>,
        output: UnboundedSender<String>,
    ) -> Client {
        Client {
            node: Node::client(name, input, output),
        }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Connects and chats until the input ends or the server goes away. The input can only
    /// be consumed once, so a second call fails.
    pub async fn connect(&self, host: &str, port: u16) -> Result<(), FlowError> {
        info!(host, port, name = self.node.name(), "connecting");
        let stream = TcpStream::connect((host, port)).await?;
        Connection::tcp(self.node.clone(), stream, CancellationToken::new())
            .run()
            .await
    }
}
