//! Command-line interface module

pub mod args;
pub mod commands;

pub use args::{Cli, ClipArgs, Commands, InspectArgs, ThumbsArgs};
pub use commands::{execute_clip, execute_inspect, execute_thumbs};
