#![allow(unused_assignments)] // thiserror/miette proc macros trigger false positives

pub mod cli;
pub mod config;
pub mod error;
pub mod invoker;
pub mod logging;
pub mod manifest;
pub mod paths;
pub mod progress;
pub mod prompt;
pub mod session;
pub mod util;
pub mod validate;
