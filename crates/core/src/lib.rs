#![forbid(unsafe_code)]

pub mod error;
pub mod mastery;
pub mod model;
pub mod progress;
pub mod scheduler;
pub mod special;
pub mod time;

pub use error::Error;
pub use time::Clock;
