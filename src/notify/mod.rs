//! Change notification.
//!
//! Mutations never talk to subscribers directly. They `touch` the
//! [`ChangeNotifier`], which coalesces bursts into a single
//! [`StoreEvent::DataChanged`] once the debounce window has passed quietly.
//! Events fan out through the [`EventBus`] to any number of [`Subscription`]s.

/// Debounced change signal and its pump thread.
pub mod debounce;
/// Event kinds, the bus and subscriber handles.
pub mod events;

pub use debounce::{ChangeNotifier, PumpHandle};
pub use events::{EventBus, StoreEvent, Subscription};
