//! Core of a remote SMS mailbox client: polling, decoding and durable
//! configuration. Windowing, tray and sound live outside this crate and talk
//! to it through [`logging::LogSink`], [`notify::Notifier`],
//! [`cache::SharedCache`] and [`config::SharedConfig`].

pub mod api;
pub mod app;
pub mod cache;
pub mod config;
pub mod logging;
pub mod notify;
pub mod storage;
pub mod sync;
pub mod utils;
