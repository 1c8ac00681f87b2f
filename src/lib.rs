pub mod app;
pub mod config;
pub mod domain;
pub mod environment;
pub mod error;
pub mod fs_util;
pub mod job;
pub mod layout;
pub mod logging;
pub mod manifest;
pub mod output;
pub mod scanner;
pub mod source;
pub mod status;
pub mod unit;
pub mod upload;
pub mod window;
