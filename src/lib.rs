//! SetuMAV - MAVLink message router
//!
//! A long-running router that terminates UDP server/client, TCP client and
//! serial transports, validates MAVLink v1/v2 frames, and forwards them
//! between transports and in-process subscribers following the MAVLink
//! routing rules: broadcasts go everywhere except back to their source,
//! targeted messages follow routes learned from inbound traffic.
//!
//! ```no_run
//! use setu_mav::dialect::common::{messages, CommonDialect};
//! use setu_mav::{subscriber, MavVersion, Query, Router, RouterConfig, SubscriptionCache};
//! use std::sync::Arc;
//!
//! let cache = SubscriptionCache::new();
//! let router = Router::start(
//!     RouterConfig {
//!         dialect: Some(Arc::new(CommonDialect)),
//!         transports: vec!["udpin:0.0.0.0:14550".parse().unwrap()],
//!         ..Default::default()
//!     },
//!     cache,
//! )?;
//!
//! let (handle, _deliveries) = subscriber();
//! router.subscribe(Query::default(), handle)?;
//! router.pack_and_send(messages::heartbeat(6, 8, 0, 0, 4), MavVersion::V2)?;
//! # Ok::<(), setu_mav::Error>(())
//! ```

pub mod config;
pub mod connection;
pub mod dialect;
pub mod error;
pub mod protocol;
pub mod router;

pub use config::{Config, TransportSpec};
pub use dialect::{Dialect, Message, Target, Value};
pub use error::{Error, Result};
pub use protocol::{Frame, MavVersion, Parser};
pub use router::subscription::{
    subscriber, Delivery, Query, Subscriber, SubscriberHandle, SubscriptionCache,
};
pub use router::{Router, RouterConfig, RouterHandle};
