pub mod diff;
pub mod paths;
pub mod service;
mod watch;
