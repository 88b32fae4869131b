use crate::channel::CommandChannel;
use maxx_proto::protocol::PACKET_BUFFER_SIZE;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

/// Bind the remote-control listener.
pub async fn bind(bind_address: &str, port: u16) -> anyhow::Result<TcpListener> {
    let addr = format!("{}:{}", bind_address, port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind remote socket {}: {}", addr, e))?;
    info!("Remote socket listening at {}", addr);
    Ok(listener)
}

/// Accept remotes forever, one handler task per connection.
///
/// `connected` tracks the number of live connections for display.
pub fn start_server(
    listener: TcpListener,
    channel: Arc<CommandChannel>,
    buffer_size: usize,
    connected: Arc<AtomicUsize>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut client_id = 0usize;

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    client_id += 1;
                    let id = client_id;
                    let count = connected.fetch_add(1, Ordering::Relaxed) + 1;
                    info!("Remote {} connected from {} ({} live)", id, peer, count);

                    let channel = channel.clone();
                    let connected = connected.clone();
                    tokio::spawn(async move {
                        handle_client(stream, channel, id, buffer_size).await;
                        let count = connected.fetch_sub(1, Ordering::Relaxed) - 1;
                        info!("Remote {} disconnected ({} live)", id, count);
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    })
}

/// Read packets until the remote hangs up.
async fn handle_client(
    mut stream: TcpStream,
    channel: Arc<CommandChannel>,
    client_id: usize,
    buffer_size: usize,
) {
    let mut buf = vec![0u8; buffer_size];
    let mut framer = PacketFramer::new();

    loop {
        match stream.read(&mut buf).await {
            Ok(0) => {
                debug!(remote = client_id, "closed connection");
                if let Some(packet) = framer.finish() {
                    submit(&channel, client_id, &packet);
                }
                break;
            }
            Ok(n) => {
                for packet in framer.push(&buf[..n]) {
                    submit(&channel, client_id, &packet);
                }
            }
            Err(e) => {
                error!(remote = client_id, "read error: {}", e);
                break;
            }
        }
    }
}

fn submit(channel: &CommandChannel, client_id: usize, packet: &[u8]) {
    match channel.submit(client_id, packet) {
        Ok(seq) => debug!(remote = client_id, "packet #{} accepted", seq),
        Err(e) => warn!(
            remote = client_id,
            "malformed packet {:?}: {}",
            String::from_utf8_lossy(packet),
            e
        ),
    }
}

/// Splits a connection's byte stream into packets.
///
/// A read with no newline and nothing pending is one whole packet (the
/// one-write-per-packet wire form).  Otherwise bytes accumulate and only
/// newline-terminated frames are released; the unterminated tail waits for
/// the next read or for EOF.
struct PacketFramer {
    pending: Vec<u8>,
}

impl PacketFramer {
    fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        if self.pending.is_empty() && !chunk.contains(&b'\n') {
            return is_packet(chunk).then(|| chunk.to_vec()).into_iter().collect();
        }

        self.pending.extend_from_slice(chunk);
        let mut packets = Vec::new();
        while let Some(end) = self.pending.iter().position(|b| *b == b'\n') {
            let frame: Vec<u8> = self.pending.drain(..=end).collect();
            let frame = &frame[..end];
            if is_packet(frame) {
                packets.push(frame.to_vec());
            }
        }

        // Already too long to be a packet: hand it to the parser to reject.
        if self.pending.len() > PACKET_BUFFER_SIZE {
            packets.push(std::mem::take(&mut self.pending));
        }
        packets
    }

    fn finish(&mut self) -> Option<Vec<u8>> {
        let tail = std::mem::take(&mut self.pending);
        is_packet(&tail).then_some(tail)
    }
}

/// Anything besides whitespace and NUL padding.
fn is_packet(data: &[u8]) -> bool {
    data.iter().any(|b| !b.is_ascii_whitespace() && *b != 0)
}
