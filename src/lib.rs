//! Client for the Yeelight Sunflower hub.
//!
//! One hardware hub fans a line-oriented TCP protocol out to a set of
//! attached light fixtures. [`Hub`] owns the single connection and a
//! throttled cache of per-fixture state; [`Bulb`] handles read through that
//! cache and send fire-and-forget set commands.
//!
//! # Quick start
//!
//! ```no_run
//! use yeelight_sunflower::Hub;
//!
//! let hub = Hub::new("192.168.1.59", 10003);
//! if hub.available() {
//!     for bulb in hub.get_lights() {
//!         println!("{}: {:?} at {}%", bulb.zid(), bulb.rgb_color(), bulb.brightness());
//!     }
//! }
//! ```
//!
//! Reads are as fresh as the refresh throttle allows; writes return the
//! hub's raw echo without interpreting it, so re-query to observe confirmed
//! state. A hub that cannot be reached is not an error: the [`Hub`] is still
//! constructed, `available()` reports false, and `get_lights()` stays empty.
//!
//! Logging goes through the [`log`] facade; install any logger to see
//! protocol traffic at debug level.

mod bulb;
mod config;
mod hub;
mod protocol;
mod session;

pub use bulb::{Bulb, BulbState};
pub use config::{DEFAULT_HOST, DEFAULT_PORT, HubConfig};
pub use hub::Hub;
pub use protocol::{FieldLayout, LightData};
