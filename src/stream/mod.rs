//! Stream adapters for session state feeds

mod throttle;

pub use throttle::{Throttle, ThrottleExt};
