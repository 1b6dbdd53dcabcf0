//! Client side of a home security camera monitor.
//!
//! The core is the push subscription lifecycle: [`subscription`] owns the
//! toggle state, [`registrar`] keeps the platform subscription and the
//! backend registry in step, and [`delivery`] renders pushes without any
//! page open. [`feed`] keeps the event list fresh from [`stream`] signals.
//! Browser capabilities are reached through the traits in [`platform`].

pub mod backend;
pub mod consts;
pub mod delivery;
pub mod desktop;
pub mod diagnostics;
mod error;
pub mod feed;
pub mod keycodec;
mod model;
pub mod permission;
pub mod platform;
pub mod registrar;
pub mod settings;
pub mod stream;
pub mod subscription;
mod util;

#[cfg(test)]
mod testing;

pub use error::{FeedError, PushError, SettingsError};
pub use model::{
    Detection, EventItem, FeedSnapshot, PushEvent, PushSubscription, RegisteredSubscription,
    SubscriptionKey, SubscriptionKeys,
};
