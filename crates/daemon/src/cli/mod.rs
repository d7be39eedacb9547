pub mod args;
pub mod op;
pub mod ops;

pub use ops::{Daemon, Encrypt, Health, Init, Poll, Probe, Version};
