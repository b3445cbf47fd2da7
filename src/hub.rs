//! Hub object: cached fixture table with throttled refresh.
//!
//! The hub is the single gateway for every attached bulb. Fixture state
//! lives in one insertion-ordered table keyed by zid; refreshes mutate
//! entries in place and never remove them, so a fixture that drops out of a
//! reply keeps its last-known state.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::bulb::{Bulb, BulbState};
use crate::config::HubConfig;
use crate::protocol::{self, LightData};
use crate::session::Session;

/// State shared between a [`Hub`] and the [`Bulb`] handles it creates.
pub(crate) struct HubShared {
    session: Session,
    config: HubConfig,
    state: Mutex<HubState>,
}

struct HubState {
    /// Fixture table, keyed by zid in first-seen order. Entries are updated
    /// in place and never removed.
    lights: IndexMap<String, BulbState>,
    /// When a refresh was last attempted (monotonic; drives the throttle).
    last_attempt: Option<Instant>,
    /// When a refresh last yielded fixture data (wall clock; diagnostic).
    last_refresh: Option<DateTime<Utc>>,
}

/// Yeelight Sunflower hub.
///
/// All bulbs are attached to the one hub, reached over a single TCP
/// connection. Constructing a `Hub` attempts the connect immediately;
/// failure is tolerated and leaves the hub permanently unavailable rather
/// than returning an error.
pub struct Hub {
    shared: Arc<HubShared>,
}

impl Hub {
    /// Connect to a hub at `host:port` with default tunables.
    pub fn new(host: impl Into<String>, port: u16) -> Hub {
        Hub::with_config(HubConfig::new(host, port))
    }

    /// Connect to a hub described by `config`.
    pub fn with_config(config: HubConfig) -> Hub {
        let session = Session::connect(&config);
        Hub {
            shared: Arc::new(HubShared {
                session,
                config,
                state: Mutex::new(HubState {
                    lights: IndexMap::new(),
                    last_attempt: None,
                    last_refresh: None,
                }),
            }),
        }
    }

    /// Handles for every known fixture, in first-seen order.
    ///
    /// Refreshes from the hub first unless a refresh was attempted within
    /// the throttle interval. A failed or empty poll returns the previously
    /// known fixtures unchanged.
    pub fn get_lights(&self) -> Vec<Bulb> {
        self.shared.refresh();
        self.shared.handles()
    }

    /// Query the hub for current per-fixture data, keyed by zid.
    ///
    /// Unthrottled; transport failures yield an empty map.
    pub fn get_data(&self) -> IndexMap<String, LightData> {
        self.shared.get_data()
    }

    /// Whether the hub answers its heartbeat.
    pub fn available(&self) -> bool {
        match self.shared.session.send_command(protocol::HEARTBEAT_COMMAND) {
            Ok(reply) => reply.contains(protocol::HEARTBEAT_ACK),
            Err(e) => {
                log::debug!("heartbeat failed: {e}");
                false
            }
        }
    }

    /// Send a raw protocol command and return the reply text.
    ///
    /// Transport failures are logged and map to `None`.
    pub fn send_command(&self, command: &str) -> Option<String> {
        self.shared.send_command(command)
    }

    /// Wall-clock time of the last refresh that yielded fixture data.
    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.shared.lock_state().last_refresh
    }
}

impl HubShared {
    pub(crate) fn send_command(&self, command: &str) -> Option<String> {
        match self.session.send_command(command) {
            Ok(reply) => Some(reply),
            Err(e) => {
                log::error!("error sending command: {e}");
                None
            }
        }
    }

    /// Query and decode the device list; empty on any transport failure.
    fn get_data(&self) -> IndexMap<String, LightData> {
        match self.session.send_command(protocol::QUERY_LIGHTS_COMMAND) {
            Ok(reply) => {
                let data = protocol::parse_light_data(&reply, &self.config.layout);
                log::debug!("device list: {} fixtures", data.len());
                data
            }
            Err(e) => {
                log::error!("device-list query failed: {e}");
                IndexMap::new()
            }
        }
    }

    /// Refresh the fixture table if the throttle interval has elapsed.
    ///
    /// The attempt is stamped before the network round trip, so a
    /// persistently-down hub is polled at most once per interval instead of
    /// on every call. The state lock is released during the round trip;
    /// callers arriving inside the window read the cache without blocking
    /// on the socket. A failed or empty poll leaves the table untouched.
    pub(crate) fn refresh(&self) {
        {
            let mut state = self.lock_state();
            if let Some(at) = state.last_attempt {
                if at.elapsed() < self.config.refresh_interval {
                    log::debug!("using cached light data");
                    return;
                }
            }
            state.last_attempt = Some(Instant::now());
        }

        let data = self.get_data();
        if data.is_empty() {
            return;
        }

        let seen = Utc::now();
        let mut state = self.lock_state();
        for (zid, values) in data {
            let entry = BulbState::from_data(values, seen);
            match state.lights.get_mut(&zid) {
                Some(existing) => *existing = entry,
                None => {
                    state.lights.insert(zid, entry);
                }
            }
        }
        state.last_refresh = Some(seen);
    }

    /// Handles for every known fixture, in first-seen order.
    fn handles(self: &Arc<Self>) -> Vec<Bulb> {
        self.lock_state()
            .lights
            .keys()
            .map(|zid| Bulb::new(Arc::clone(self), zid.clone()))
            .collect()
    }

    /// Last cached state for one fixture. A zid that has never appeared in
    /// a reply reads as a default (offline, dark) state.
    pub(crate) fn light_state(&self, zid: &str) -> BulbState {
        self.lock_state().lights.get(zid).cloned().unwrap_or_default()
    }

    fn lock_state(&self) -> MutexGuard<'_, HubState> {
        // poisoning is ignored: the table is always left in a coherent state
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
