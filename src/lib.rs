//! AutoShelf - hands new downloads to a shelf app and tidies up after it
//!
//! Watches one folder, sends every finished download to the shelf
//! application through the Services menu, and closes the shelf window it
//! opened once a timeout passes or the file goes away.

pub mod app;
pub mod cli;
pub mod config;
pub mod detector;
pub mod error;
pub mod logging;
pub mod notifications;
pub mod permissions;
pub mod shelf;
