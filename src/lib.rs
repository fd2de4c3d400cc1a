// #![warn(missing_docs)]

#[macro_use]
extern crate log;

pub mod wm;

mod bindings;
mod client;
mod config;
mod geometry;
mod workspace;
mod xconnection;

pub use config::Config;
pub use wm::WindowManager;
pub use xconnection::{XConn, XcbConnection};
