//! # FACHPI, a fast chat protocol.
//!
//! A server accepts any number of clients over TCP. Every line a client sends is relayed to
//! all connected clients, the sender included. The plain server prefixes each line with the
//! local time and the sender's name; the SIFOSC server evaluates the line as a formula (see
//! [`sifosc`]) and relays the result instead.
//!
//! On the wire every frame is a little-endian `i32` length followed by that many bytes. A
//! flow starts with both ends sending a fixed 16-byte signature and then their display
//! names; only after that do chat lines flow.
//!
//! Architecture:
//!
//!  TcpListener
//!     v
//! +-----------+              +-------------------+                      +----------------+
//! | TcpStream |<-FrameCodec->| CommunicationFlow |<-UnboundedReceiver---| BroadcastRouter|
//! +-----------+              +-------------------+                      |                |
//! | TcpStream |<-FrameCodec->| CommunicationFlow |<-UnboundedReceiver---|                |
//! +-----------+              +-------------------+                      +----------------+
//! | ...       |    ...       |  ...              |                              ^
//! +-----------+              +-------------------+                              |
//!                                     |                                         |
//!                                     +--> Node::consume_inbound --transform----+
//!
//! On a client the flow's outbound queue is fed from stdin and received lines go to stdout.

pub mod cli;
pub mod client;
pub mod error;
pub mod handshake;
pub mod logger;
pub mod message;
pub mod node;
pub mod peer;
pub mod router;
pub mod server;
pub mod sifosc;
pub mod terminal;

pub use client::Client;
pub use error::{FlowError, FrameError, HandshakeError, ScriptError};
pub use node::{MessageTransform, Node};
pub use peer::{CommunicationFlow, Connection, FlowHandle, FlowId, FlowState};
pub use server::Server;
