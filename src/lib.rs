//! Chalkboard — a shared raster drawing board with per-author undo/redo.
//!
//! ARCHITECTURE
//! ============
//! Every author keeps a replica of the board: an [`log::ActionLog`] of
//! replayable actions over a [`surface::Surface`]. Replicas exchange
//! [`sync::SyncMessage`]s through a relay that puts every board's messages in
//! one total order, so all replicas apply the same log and converge.
//!
//! | Module     | Role                                                   |
//! |------------|--------------------------------------------------------|
//! | `raster`   | RGBA pixel buffer, geometry, colors, painting          |
//! | `surface`  | async drawing-surface trait; `Raster` implements it    |
//! | `snapshot` | immutable full-surface captures and their encoding     |
//! | `action`   | authored, replayable edits; eraser passes              |
//! | `log`      | shared history with selective per-author undo/redo     |
//! | `board`    | one author's replica and its single-writer worker      |
//! | `sync`     | replicated messages and outbound channels              |
//! | `frame`    | wire envelope and error codes                          |
//! | `store`    | snapshot persistence (memory, Postgres)                |
//! | `config`   | environment configuration                              |
//! | `routes`   | relay HTTP + websocket endpoints                       |

pub mod action;
pub mod board;
pub mod config;
pub mod db;
pub mod frame;
pub mod log;
pub mod raster;
pub mod routes;
pub mod services;
pub mod snapshot;
pub mod state;
pub mod store;
pub mod surface;
pub mod sync;
