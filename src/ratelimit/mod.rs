//! Rate limiting logic: window geometry, counters and the limiter entry point.

mod counter;
pub(crate) mod key;
mod limiter;
mod policy;
pub(crate) mod window;

pub use counter::{LimitStatus, WindowedCounter};
pub use key::{RecordKey, DEFAULT_KEY_PREFIX};
pub use limiter::RateLimiter;
pub use policy::WaitPolicy;
pub use window::{unix_now, WindowSpec};
