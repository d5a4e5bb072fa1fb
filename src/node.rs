//! The roles a process can play on the chat network.
//!
//! A node decides two things for each of its flows: where the send loop gets its outgoing
//! lines from ([`Node::open_outbound`]) and what happens to each line the receive loop reads
//! ([`Node::consume_inbound`]).

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{Local, NaiveDateTime, Timelike};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{info, trace};

use crate::error::FlowError;
use crate::peer::FlowId;
use crate::router::{BroadcastRouter, Registration};
use crate::sifosc;

/// Date and time part of a stamp; the fraction is appended in 100ns ticks.
pub const STAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Display name used when none is configured.
pub const DEFAULT_NAME: &str = "anonymous";

/// Formats a chat line the way the server relays it:
/// `[yyyy/MM/dd HH:mm:ss.fffffff]<sender>text`.
pub fn stamp(at: NaiveDateTime, sender: &str, text: &str) -> String {
    // Leap seconds report more than 10^9 nanoseconds.
    let ticks = (at.nanosecond() / 100).min(9_999_999);
    format!(
        "[{}.{:07}]<{}>{}",
        at.format(STAMP_FORMAT),
        ticks,
        sender,
        text
    )
}

/// What a server does to a received line before broadcasting it.
#[derive(Clone)]
pub enum MessageTransform {
    /// Prefix with the local time and the sender's name.
    Stamp,
    /// Evaluate the line as a SIFOSC formula and relay the result.
    Sifosc,
    Custom(Arc<dyn Fn(&str, &str) -> String + Send + Sync>),
}

impl MessageTransform {
    pub fn custom(transform: impl Fn(&str, &str) -> String + Send + Sync + 'static) -> Self {
        MessageTransform::Custom(Arc::new(transform))
    }

    pub fn apply(&self, sender: &str, text: &str) -> String {
        match self {
            MessageTransform::Stamp => stamp(Local::now().naive_local(), sender, text),
            MessageTransform::Sifosc => sifosc::transform_message(text),
            MessageTransform::Custom(transform) => transform(sender, text),
        }
    }
}

impl fmt::Debug for MessageTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageTransform::Stamp => f.write_str("Stamp"),
            MessageTransform::Sifosc => f.write_str("Sifosc"),
            MessageTransform::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[derive(Debug)]
pub struct ServerNode {
    name: String,
    router: Arc<BroadcastRouter>,
    transform: MessageTransform,
}

#[derive(Debug)]
pub struct ClientNode {
    name: String,
    /// Lines typed locally. Claimed by the first flow that opens.
    input: Mutex<Option<UnboundedReceiver<String>>>,
    output: UnboundedSender<String>,
}

#[derive(Debug, Clone)]
pub enum Node {
    Server(Arc<ServerNode>),
    Client(Arc<ClientNode>),
}

impl Node {
    pub fn server(name: impl Into<String>, transform: MessageTransform) -> Node {
        Node::Server(Arc::new(ServerNode {
            name: name.into(),
            router: BroadcastRouter::new(),
            transform,
        }))
    }

    pub fn client(
        name: impl Into<String>,
        input: UnboundedReceiver<String>,
        output: UnboundedSender<String>,
    ) -> Node {
        Node::Client(Arc::new(ClientNode {
            name: name.into(),
            input: Mutex::new(Some(input)),
            output,
        }))
    }

    pub fn name(&self) -> &str {
        match self {
            Node::Server(server) => &server.name,
            Node::Client(client) => &client.name,
        }
    }

    pub fn router(&self) -> Option<&Arc<BroadcastRouter>> {
        match self {
            Node::Server(server) => Some(&server.router),
            Node::Client(_) => None,
        }
    }

    /// Hands the send loop of `flow` the queue it should drain.
    pub fn open_outbound(&self, flow: FlowId) -> Result<Outbox, FlowError> {
        match self {
            Node::Server(server) => {
                let (route, queue) = server.router.register(flow);
                Ok(Outbox {
                    queue,
                    _route: Some(route),
                })
            }
            Node::Client(client) => {
                let queue = client
                    .input
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take()
                    .ok_or(FlowError::InputUnavailable)?;
                Ok(Outbox {
                    queue,
                    _route: None,
                })
            }
        }
    }

    /// Handles one line received from `remote`.
    pub fn consume_inbound(&self, remote: &str, text: &str) {
        match self {
            Node::Server(server) => {
                let line = server.transform.apply(remote, text);
                info!("{}", line);
                let delivered = server.router.broadcast(&line);
                trace!(delivered, "line broadcast");
            }
            Node::Client(client) => {
                if client.output.send(format!("<{}>{}", remote, text)).is_err() {
                    trace!("console is gone, dropping line");
                }
            }
        }
    }
}

/// Outgoing lines of one flow, plus its route on a server.
#[derive(Debug)]
pub struct Outbox {
    queue: UnboundedReceiver<String>,
    _route: Option<Registration>,
}

impl Outbox {
    /// Next line to send; `None` once nothing more can arrive.
    pub async fn next(&mut self) -> Option<String> {
        self.queue.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tokio::sync::mpsc;

    #[test]
    fn stamp_has_seven_fraction_digits() {
        let at = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_nano_opt(7, 5, 3, 120_450_600)
            .unwrap();
        assert_eq!(
            stamp(at, "alice", "hi there"),
            "[2024/03/09 07:05:03.1204506]<alice>hi there"
        );
    }

    #[test]
    fn sifosc_transform_replaces_the_text() {
        assert_eq!(MessageTransform::Sifosc.apply("bob", "2 * 21"), "42");
    }

    #[tokio::test]
    async fn server_broadcasts_to_every_open_outbox() {
        let node = Node::server("hub", MessageTransform::custom(|from, text| format!("{from}:{text}")));
        let mut first = node.open_outbound(1).unwrap();
        let mut second = node.open_outbound(2).unwrap();

        node.consume_inbound("alice", "hello");
        assert_eq!(first.next().await.unwrap(), "alice:hello");
        assert_eq!(second.next().await.unwrap(), "alice:hello");

        drop(second);
        assert_eq!(node.router().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn client_input_can_only_be_claimed_once() {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (output_tx, mut output_rx) = mpsc::unbounded_channel();
        let node = Node::client("carol", input_rx, output_tx);

        let mut outbox = node.open_outbound(1).unwrap();
        assert!(matches!(
            node.open_outbound(2),
            Err(FlowError::InputUnavailable)
        ));

        input_tx.send("typed".to_owned()).unwrap();
        assert_eq!(outbox.next().await.unwrap(), "typed");

        node.consume_inbound("hub", "[t]<alice>hey");
        assert_eq!(output_rx.recv().await.unwrap(), "<hub>[t]<alice>hey");
    }
}
