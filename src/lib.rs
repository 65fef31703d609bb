// Library interface for the human verification gate
// Rendering surfaces (CLI, web shells) drive the session controller through this crate

pub mod analyzer;
pub mod clock;
pub mod config;
pub mod engine;
pub mod events;
pub mod form;
pub mod gate;
pub mod input;
pub mod lock_utils;
pub mod otp;
pub mod session;
pub mod storage;
