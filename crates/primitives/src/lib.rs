//! Small building blocks shared by the scope, realtime and notification crates.

/// Injectable wall clock.
pub mod clock;
/// Observer registration with explicit unsubscribe handles.
pub mod observer;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use observer::{NotifyReport, ObserverList, Subscription};
