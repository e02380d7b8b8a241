//! Live data synchronization for DataFlow consumers.
//!
//! Two paths keep displayed state current:
//!
//! - **push**: a [`Subscription`] holds one resilient stream connection,
//!   normalizes every frame into an [`Event`] and projects it into an
//!   ordered history plus a latest-event view;
//! - **pull**: a [`RefreshCoordinator`] re-fetches registered slices on a
//!   fixed cadence and merges results with pushed values so that newer
//!   data is never overwritten by older data.
//!
//! [`DashboardFeed`] and [`job_log_subscription`] wire both paths to the
//! platform's concrete endpoints.

pub mod config;
pub mod event;
pub mod feeds;
pub mod projection;
pub mod reconnect;
pub mod refresh;
pub mod subscription;
pub mod transport;

pub use config::{ConfigError, LiveConfig};
pub use event::{normalize, Event, Frame};
pub use feeds::{job_log_subscription, DashboardFeed};
pub use projection::{EventHistory, LatestEvent, Projection};
pub use reconnect::ReconnectPolicy;
pub use refresh::{
    Displayed, Origin, PullSource, RefreshCoordinator, RefreshHandle, SliceHandle,
};
pub use subscription::{ConnectionState, StreamConfig, StreamSlot, Subscription};
pub use transport::{stream_url, Connector, StreamError, Transport, WsConnector};
