pub mod activity;
pub mod cli;
pub mod config;
pub mod launcher;
pub mod lifecycle;
pub mod logging;
pub mod paths;
pub mod probe;
pub mod progress;
pub mod reconcile;
pub mod rpc;
pub mod select;
pub mod state;
pub mod supervisor;
pub mod sys;
pub mod transfer;
pub mod tray;
pub mod tui;
pub mod uploader;
