use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Size of the read buffer for one packet.  A client delivers one command per
/// write; anything beyond this is not a valid packet.
pub const PACKET_BUFFER_SIZE: usize = 1024;

/// Separator between packet fields.
pub const FIELD_DELIMITER: char = '^';

/// One remote-control command, parsed atomically from a packet.
///
/// Wire form: `selection^intent^key`, or `query^selection^intent^key` when the
/// packet carries a query.  Empty fields mean "keep what you have" for the
/// query and the selection, and "no key" for the key.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteCommand {
    /// Requested selection; wraps modulo the entry count.  `None` keeps the
    /// current selection.
    pub selection: Option<i64>,
    /// `true` requests playback start, `false` requests stop.
    pub play: bool,
    /// Single-character control signal for the external player.
    pub key: Option<char>,
    /// Catalog query override.  `None` keeps the current query.
    pub query: Option<String>,
}

impl RemoteCommand {
    /// Parse a raw packet as read from the socket (NUL padding allowed).
    pub fn parse(raw: &[u8]) -> Result<Self, ProtocolError> {
        if raw.len() > PACKET_BUFFER_SIZE {
            return Err(ProtocolError::Oversized(raw.len()));
        }
        let text = std::str::from_utf8(raw).map_err(|_| ProtocolError::Encoding)?;
        Self::parse_str(text)
    }

    pub fn parse_str(text: &str) -> Result<Self, ProtocolError> {
        let cleaned = text.replace('\0', "");
        let fields: Vec<&str> = cleaned.trim().split(FIELD_DELIMITER).map(str::trim).collect();

        let (query, rest) = match fields.len() {
            n if n < 3 => return Err(ProtocolError::Truncated(n)),
            3 => (None, &fields[..3]),
            _ => (Some(fields[0]), &fields[1..4]),
        };

        let selection = match rest[0] {
            "" => None,
            s => Some(
                s.parse::<i64>()
                    .map_err(|_| ProtocolError::InvalidSelection(s.to_string()))?,
            ),
        };

        let play = rest[1].parse::<i64>().map(|v| v == 1).unwrap_or(false);

        let mut chars = rest[2].chars();
        let key = match (chars.next(), chars.next()) {
            (None, _) => None,
            (Some(c), None) => Some(c),
            (Some(_), Some(_)) => return Err(ProtocolError::InvalidKey(rest[2].to_string())),
        };

        Ok(Self {
            selection,
            play,
            key,
            query: query.filter(|q| !q.is_empty()).map(str::to_string),
        })
    }

    /// Encode back to wire form.  A `^` inside the query cannot be carried and
    /// is replaced by a space.
    pub fn to_packet(&self) -> String {
        let selection = self.selection.map(|s| s.to_string()).unwrap_or_default();
        let intent = if self.play { "1" } else { "0" };
        let key = self.key.map(String::from).unwrap_or_default();
        match &self.query {
            Some(q) => format!(
                "{}^{}^{}^{}",
                q.replace(FIELD_DELIMITER, " "),
                selection,
                intent,
                key
            ),
            None => format!("{}^{}^{}", selection, intent, key),
        }
    }
}

/// A parsed command as published by the command channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    /// Monotonic across all clients; higher means received later.
    pub seq: u64,
    /// Connection that delivered the packet (0 for the HTTP endpoint).
    pub client: usize,
    pub command: RemoteCommand,
}
