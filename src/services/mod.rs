//! Relay services used by the websocket route.
//!
//! Service modules own room bookkeeping so route handlers stay focused on
//! protocol translation.

pub mod room;
