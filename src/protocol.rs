//! Wire protocol for the Sunflower hub.
//!
//! Defines command builders, the device-list response grammar with its
//! firmware-dependent field offsets, push-frame classification, and the
//! transport error taxonomy.
//!
//! All frames are UTF-8 text. Commands are `,`-separated with a trailing
//! comma and terminated `"\r\n"`; the hub's replies share the socket with
//! asynchronous push frames and are only softly delimited by newlines.

use indexmap::IndexMap;
use serde::Serialize;

/// Query-all command; the hub answers with one record per fixture.
pub(crate) const QUERY_LIGHTS_COMMAND: &str = "GLB,,,,0,\r\n";

/// Heartbeat probe.
pub(crate) const HEARTBEAT_COMMAND: &str = "HB\r\n";

/// Token expected somewhere in a heartbeat reply.
pub(crate) const HEARTBEAT_ACK: &str = "HACK";

/// Fixed-length preamble of a device-list reply (`"GLB "`).
const REPLY_PREAMBLE_LEN: usize = 4;

/// Prefix of an asynchronous status push frame.
const PUSH_STATUS_PREFIX: &str = "S";

/// Prefix of an asynchronous new-fixture announcement.
const PUSH_NEW_FIXTURE_PREFIX: &str = "NEW";

/// Positional field offsets within one `,`-separated fixture record.
///
/// The offsets differ slightly between hub firmware revisions, so parse
/// sites take a layout value instead of hard-coding indices. [`CURRENT`] is
/// the assumed-authoritative layout; select [`LEGACY`] through
/// [`HubConfig`](crate::HubConfig) for older firmware.
///
/// [`CURRENT`]: FieldLayout::CURRENT
/// [`LEGACY`]: FieldLayout::LEGACY
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldLayout {
    /// Offset of the fixture ID.
    pub zid: usize,
    /// Offset of the 0/1 online flag, if this revision reports one.
    pub online: Option<usize>,
    /// Offset of the red channel.
    pub red: usize,
    /// Offset of the green channel.
    pub green: usize,
    /// Offset of the blue channel.
    pub blue: usize,
    /// Offset of the brightness level.
    pub level: usize,
}

impl FieldLayout {
    /// Layout spoken by current hub firmware:
    /// `[zid, ?, online, ?, red, green, blue, level, ?]`.
    pub const CURRENT: FieldLayout = FieldLayout {
        zid: 0,
        online: Some(2),
        red: 4,
        green: 5,
        blue: 6,
        level: 7,
    };

    /// Older firmware revision: same color/level offsets, no online flag.
    /// Fixtures present in a reply are treated as online.
    pub const LEGACY: FieldLayout = FieldLayout {
        online: None,
        ..FieldLayout::CURRENT
    };

    /// Minimum field count a record needs to be decodable.
    fn min_fields(&self) -> usize {
        let mut max = self
            .zid
            .max(self.red)
            .max(self.green)
            .max(self.blue)
            .max(self.level);
        if let Some(online) = self.online {
            max = max.max(online);
        }
        max + 1
    }
}

impl Default for FieldLayout {
    fn default() -> Self {
        FieldLayout::CURRENT
    }
}

/// Decoded fields of one device-list record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LightData {
    /// Whether the hub reported the fixture reachable.
    pub online: bool,
    /// Red channel, 0-255.
    pub red: u8,
    /// Green channel, 0-255.
    pub green: u8,
    /// Blue channel, 0-255.
    pub blue: u8,
    /// Brightness level, 0-100.
    pub level: u8,
}

/// Transport errors for hub communication.
///
/// These never cross the public API: the hub layer absorbs them into empty
/// results and logs the cause.
#[derive(Debug, thiserror::Error)]
pub(crate) enum SessionError {
    /// The initial connect failed; the session stays down for its lifetime.
    #[error("not connected to hub")]
    NotConnected,

    /// The first read after a command produced nothing before the timeout.
    /// The link is treated as dead and the socket is closed.
    #[error("read timed out")]
    Timeout,

    /// Every frame within the discard limit was an asynchronous push.
    #[error("no command reply after discarding {discarded} push frames")]
    NoReply { discarded: usize },

    /// I/O failure during send/receive; the socket is closed.
    #[error("io error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

/// True for asynchronous frames the hub emits outside request/response.
pub(crate) fn is_push_frame(frame: &str) -> bool {
    frame.starts_with(PUSH_STATUS_PREFIX) || frame.starts_with(PUSH_NEW_FIXTURE_PREFIX)
}

/// Format a `C` set command for one fixture.
///
/// `None` leaves that channel unchanged (empty field). The trailing comma
/// before the terminator is part of the grammar even when fields are empty.
pub(crate) fn set_command(
    zid: &str,
    red: Option<u8>,
    green: Option<u8>,
    blue: Option<u8>,
    level: Option<u8>,
) -> String {
    format!(
        "C {},{},{},{},{},\r\n",
        zid,
        opt_field(red),
        opt_field(green),
        opt_field(blue),
        opt_field(level),
    )
}

fn opt_field(value: Option<u8>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Parse a device-list reply into per-fixture data keyed by zid, preserving
/// the hub's record order.
///
/// A record with too few fields or a non-numeric value is logged and
/// skipped; one malformed record never aborts the rest of the reply.
pub(crate) fn parse_light_data(reply: &str, layout: &FieldLayout) -> IndexMap<String, LightData> {
    let mut lights = IndexMap::new();
    if reply.is_empty() {
        return lights;
    }
    let Some(body) = reply.get(REPLY_PREAMBLE_LEN..) else {
        log::warn!("device-list reply shorter than preamble: {reply:?}");
        return lights;
    };
    let body = body.trim_end_matches(['\r', '\n']);
    for record in body.split(';').filter(|r| !r.is_empty()) {
        match parse_record(record, layout) {
            Some((zid, data)) => {
                lights.insert(zid, data);
            }
            None => log::warn!("skipping malformed fixture record: {record:?}"),
        }
    }
    lights
}

fn parse_record(record: &str, layout: &FieldLayout) -> Option<(String, LightData)> {
    let fields: Vec<&str> = record.split(',').collect();
    if fields.len() < layout.min_fields() {
        return None;
    }
    let zid = fields[layout.zid];
    if zid.is_empty() {
        return None;
    }
    let online = match layout.online {
        Some(idx) => fields[idx].parse::<u8>().ok()? == 1,
        None => true,
    };
    let data = LightData {
        online,
        red: fields[layout.red].parse().ok()?,
        green: fields[layout.green].parse().ok()?,
        blue: fields[layout.blue].parse().ok()?,
        level: fields[layout.level].parse().ok()?,
    };
    Some((zid.to_string(), data))
}
