//! Command-line surface of the `fachpi` binary.

use std::net::{Ipv4Addr, SocketAddr};

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use tokio::io::{stdin, stdout, BufReader};
use tracing::info;

use crate::client::Client;
use crate::node::DEFAULT_NAME;
use crate::server::Server;
use crate::terminal;

pub const LOGO: &str = r#"
  ___ _   ___ _  _ ___ ___
 | __/_\ / __| || | _ \_ _|
 | _/ _ \ (__| __ |  _/| |
 |_/_/ \_\___|_||_|_| |___|
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExecutionMode {
    /// Relay every line to all clients, stamped with time and sender
    Server,
    /// Chat through a server from this console
    Client,
    /// Evaluate SIFOSC formulas typed on this console
    Repl,
    /// Relay the value of every line evaluated as a SIFOSC formula
    SifoscServer,
}

#[derive(Parser, Debug)]
#[command(
    name = "fachpi",
    version,
    about = "Fast chat protocol server, client and SIFOSC calculator"
)]
pub struct Args {
    #[arg(short, long, value_enum)]
    pub mode: ExecutionMode,

    /// Server to connect to in client mode. Servers listen on every interface
    #[arg(short = 'n', long, default_value = "localhost")]
    pub host_name: String,

    /// Port to connect to, or to listen on in server modes (0 picks a free one)
    #[arg(short, long, default_value_t = 0)]
    pub port: u16,

    /// Display name sent to the other end
    #[arg(short, long, default_value = DEFAULT_NAME)]
    pub user_name: String,

    #[arg(long)]
    pub no_logo: bool,

    /// Log filter, e.g. `debug` or `fachpi=trace` (overrides RUST_LOG)
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Args {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.mode == ExecutionMode::Client && self.port == 0 {
            bail!("client mode needs the server's port (--port)");
        }
        if self.user_name.is_empty() {
            bail!("the user name must not be empty");
        }
        Ok(())
    }

    /// Where the server modes listen: all interfaces, on `--port`.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }
}

pub fn print_logo() {
    println!("{}", LOGO);
    println!(" fachpi {}\n", env!("CARGO_PKG_VERSION"));
}

impl ExecutionMode {
    pub async fn run(self, args: &Args) -> anyhow::Result<()> {
        match self {
            ExecutionMode::Server => serve(Server::new(args.user_name.clone()), args).await,
            ExecutionMode::SifoscServer => {
                let server = Server::sifosc(args.user_name.clone())
                    .context("SIFOSC interpreter failed its self-check")?;
                serve(server, args).await
            }
            ExecutionMode::Client => {
                let (output, printer) = terminal::spawn_output();
                let client = Client::new(args.user_name.clone(), terminal::spawn_input(), output);
                client
                    .connect(&args.host_name, args.port)
                    .await
                    .with_context(|| format!("chat with {}:{} failed", args.host_name, args.port))?;
                // Flush whatever arrived before the flow ended.
                drop(client);
                printer.await.context("console printer panicked")?;
                Ok(())
            }
            ExecutionMode::Repl => {
                terminal::run_repl(BufReader::new(stdin()), stdout())
                    .await
                    .context("console failed")
            }
        }
    }
}

async fn serve(mut server: Server, args: &Args) -> anyhow::Result<()> {
    let bind_addr = args.bind_addr();
    let addr = server
        .start(bind_addr)
        .await
        .with_context(|| format!("could not listen on {}", bind_addr))?;
    println!("listening on {}", addr);

    tokio::signal::ctrl_c()
        .await
        .context("could not wait for Ctrl-C")?;
    info!("interrupted, shutting down");
    server.stop().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["fachpi", "-m", "server"]).unwrap();
        assert_eq!(args.mode, ExecutionMode::Server);
        assert_eq!(args.host_name, "localhost");
        assert_eq!(args.port, 0);
        assert_eq!(args.user_name, DEFAULT_NAME);
        assert!(!args.no_logo);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn servers_listen_on_every_interface() {
        let args = Args::try_parse_from(["fachpi", "-m", "server", "-p", "4000"]).unwrap();
        assert_eq!(args.bind_addr(), "0.0.0.0:4000".parse::<SocketAddr>().unwrap());

        // The host name only picks the server a client talks to.
        let args =
            Args::try_parse_from(["fachpi", "-m", "sifosc-server", "-n", "localhost"]).unwrap();
        assert!(args.bind_addr().ip().is_unspecified());
        assert_eq!(args.bind_addr().port(), 0);
    }

    #[test]
    fn client_needs_a_port() {
        let args = Args::try_parse_from(["fachpi", "--mode", "client"]).unwrap();
        assert!(args.validate().is_err());

        let args = Args::try_parse_from([
            "fachpi", "-m", "client", "-n", "chat.local", "-p", "4000", "-u", "alice",
        ])
        .unwrap();
        assert!(args.validate().is_ok());
        assert_eq!(args.host_name, "chat.local");
        assert_eq!(args.user_name, "alice");
    }

    #[test]
    fn sifosc_server_mode_is_kebab_case() {
        let args = Args::try_parse_from(["fachpi", "-m", "sifosc-server", "--no-logo"]).unwrap();
        assert_eq!(args.mode, ExecutionMode::SifoscServer);
        assert!(args.no_logo);
    }

    #[test]
    fn mode_is_required() {
        assert!(Args::try_parse_from(["fachpi"]).is_err());
    }
}
