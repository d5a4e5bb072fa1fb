//! Bridges the chat engine with the process's stdin and stdout.
//!
//! Lines typed on stdin go into an unbounded channel that a client drains; lines arriving
//! from the network are written to stdout one per line. Typing `/quit` or `/exit` ends the
//! input.

use std::io;

use tokio::io::{stdin, stdout, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::sifosc;

const QUIT_COMMANDS: [&str; 2] = ["/quit", "/exit"];

fn is_quit(line: &str) -> bool {
    QUIT_COMMANDS.contains(&line.trim())
}

/// Forwards every line of `input` to `lines` until the input ends, a quit command is typed
/// or nobody listens anymore. Returns the number of lines forwarded.
pub async fn forward_lines<R>(input: R, lines: UnboundedSender<String>) -> io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut input = input.lines();
    let mut forwarded = 0;
    while let Some(line) = input.next_line().await? {
        if is_quit(&line) {
            debug!("quit requested");
            break;
        }
        if lines.send(line).is_err() {
            break;
        }
        forwarded += 1;
    }
    Ok(forwarded)
}

/// Reads stdin in the background.
pub fn spawn_input() -> UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        if let Err(err) = forward_lines(BufReader::new(stdin()), tx).await {
            warn!(%err, "stopped reading the console");
        }
    });
    rx
}

/// Writes each received line to `output` until the channel closes.
pub async fn print_lines<W>(mut lines: UnboundedReceiver<String>, mut output: W) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = lines.recv().await {
        output.write_all(line.as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
    }
    Ok(())
}

/// Prints to stdout in the background. The task ends once every sender is dropped.
pub fn spawn_output() -> (UnboundedSender<String>, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(async move {
        if let Err(err) = print_lines(rx, stdout()).await {
            warn!(%err, "stopped writing the console");
        }
    });
    (tx, task)
}

/// Evaluates each input line as a formula and writes the result, until the input ends.
pub async fn run_repl<R, W>(input: R, mut output: W) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut input = input.lines();
    while let Some(line) = input.next_line().await? {
        if is_quit(&line) {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }
        let reply = match sifosc::run_script_line(&line) {
            Ok(reply) => reply,
            Err(fault) => format!("error: {fault}"),
        };
        output.write_all(reply.as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
    }
    Ok(())
}
