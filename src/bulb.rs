//! Bulb handle: one physical fixture reached through its hub.
//!
//! Handles are created only by the hub's refresh logic and stay valid for
//! the hub's lifetime. Reads go through the hub's throttled cache; writes
//! are fire-and-forget and return the hub's raw echo, so the cache is not
//! updated optimistically.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::hub::HubShared;
use crate::protocol::{self, LightData};

/// Cached state for one fixture.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BulbState {
    /// Whether the hub reported the fixture reachable in the latest reply.
    pub online: bool,
    /// Red channel, 0-255.
    pub red: u8,
    /// Green channel, 0-255.
    pub green: u8,
    /// Blue channel, 0-255.
    pub blue: u8,
    /// Brightness level, 0-100.
    pub level: u8,
    /// When the fixture last appeared in a device-list reply.
    pub last_seen: Option<DateTime<Utc>>,
}

impl BulbState {
    pub(crate) fn from_data(data: LightData, seen: DateTime<Utc>) -> BulbState {
        BulbState {
            online: data.online,
            red: data.red,
            green: data.green,
            blue: data.blue,
            level: data.level,
            last_seen: Some(seen),
        }
    }
}

/// One physical light fixture, identified by its wireless node address.
///
/// Cloning a handle is cheap; every handle for the same zid observes the
/// same cached table entry. A fixture that stops appearing in hub replies
/// keeps serving its last-known values.
#[derive(Clone)]
pub struct Bulb {
    shared: Arc<HubShared>,
    zid: String,
}

impl Bulb {
    pub(crate) fn new(shared: Arc<HubShared>, zid: String) -> Bulb {
        Bulb { shared, zid }
    }

    /// The fixture ID. Does not refresh.
    pub fn zid(&self) -> &str {
        &self.zid
    }

    /// Brightness level 0-100, as fresh as the hub's throttle allows.
    pub fn brightness(&self) -> u8 {
        self.update();
        self.cached().level
    }

    /// Color as `[red, green, blue]`, each 0-255.
    pub fn rgb_color(&self) -> [u8; 3] {
        self.update();
        let state = self.cached();
        [state.red, state.green, state.blue]
    }

    /// Whether the fixture was online in the latest device list.
    pub fn available(&self) -> bool {
        self.update();
        self.cached().online
    }

    /// On means nonzero brightness.
    pub fn is_on(&self) -> bool {
        self.update();
        self.cached().level > 0
    }

    /// Refreshed snapshot of all cached fields.
    pub fn state(&self) -> BulbState {
        self.update();
        self.cached()
    }

    /// When the fixture last appeared in a device-list reply.
    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.update();
        self.cached().last_seen
    }

    /// Turn the bulb on at full brightness.
    pub fn turn_on(&self) -> Option<String> {
        self.send_set(None, None, None, Some(100))
    }

    /// Turn the bulb off.
    pub fn turn_off(&self) -> Option<String> {
        self.send_set(None, None, None, Some(0))
    }

    /// Set color, leaving brightness unchanged.
    pub fn set_rgb_color(&self, red: u8, green: u8, blue: u8) -> Option<String> {
        self.send_set(Some(red), Some(green), Some(blue), None)
    }

    /// Set brightness 0-100, leaving color unchanged.
    pub fn set_brightness(&self, level: u8) -> Option<String> {
        self.send_set(None, None, None, Some(level))
    }

    /// Set color and brightness together.
    pub fn set_all(&self, red: u8, green: u8, blue: u8, level: u8) -> Option<String> {
        self.send_set(Some(red), Some(green), Some(blue), Some(level))
    }

    fn send_set(
        &self,
        red: Option<u8>,
        green: Option<u8>,
        blue: Option<u8>,
        level: Option<u8>,
    ) -> Option<String> {
        let command = protocol::set_command(&self.zid, red, green, blue, level);
        let reply = self.shared.send_command(&command);
        log::debug!("set {command:?}: {reply:?}");
        reply
    }

    fn update(&self) {
        self.shared.refresh();
    }

    fn cached(&self) -> BulbState {
        self.shared.light_state(&self.zid)
    }
}

impl fmt::Debug for Bulb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bulb").field("zid", &self.zid).finish()
    }
}
