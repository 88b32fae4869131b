//! Command-line remote for streammaxx.
//!
//! One-shot: `maxx-remote 3 --play` sends a single packet and exits.
//! Interactive: `maxx-remote --stdin` keeps one connection open and sends every
//! line read from stdin as a raw packet.

use anyhow::Context;
use clap::Parser;
use maxx_proto::platform::REMOTE_TCP_PORT;
use maxx_proto::protocol::RemoteCommand;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[derive(Parser, Debug)]
#[command(name = "maxx-remote", version, about = "Send remote-control packets to streammaxx")]
struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = REMOTE_TCP_PORT)]
    port: u16,

    /// Catalog query to browse.
    #[arg(long, short)]
    query: Option<String>,

    /// Entry to select; negative values count from the end.
    #[arg(allow_negative_numbers = true)]
    selection: Option<i64>,

    /// Start playback of the selection.
    #[arg(long, conflicts_with = "stop")]
    play: bool,

    /// Stop playback (the default intent).
    #[arg(long)]
    stop: bool,

    /// Player key: `+` play/pause, `>` seek forward, `<` seek back.
    #[arg(long, short)]
    key: Option<char>,

    /// Send raw packets read line by line from stdin over one connection.
    #[arg(long, conflicts_with_all = ["query", "selection", "play", "stop", "key"])]
    stdin: bool,
}

fn build_command(args: &Args) -> RemoteCommand {
    RemoteCommand {
        selection: args.selection,
        play: args.play && !args.stop,
        key: args.key,
        query: args.query.clone().filter(|q| !q.trim().is_empty()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);
    let mut stream = TcpStream::connect(&addr)
        .await
        .with_context(|| format!("failed to connect to {}", addr))?;

    if args.stdin {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Err(e) = RemoteCommand::parse_str(line) {
                eprintln!("skipping {:?}: {}", line, e);
                continue;
            }
            stream.write_all(format!("{}\n", line).as_bytes()).await?;
        }
    } else {
        let packet = build_command(&args).to_packet();
        stream.write_all(packet.as_bytes()).await?;
        println!("sent {:?} to {}", packet, addr);
    }

    stream.shutdown().await?;
    Ok(())
}
