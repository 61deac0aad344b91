//! # ytchat
//!
//! Ask questions about registered videos and get answers grounded in
//! timestamped segments.
//!
//! A video is registered by URL. Its metadata is fetched from the analysis
//! service, the record is stored, and a background job asks the service to
//! split the video into time-bounded segments. Questions are forwarded to
//! the service's answering endpoint; answers that cite a video and time
//! range come back with the full video record attached, and every exchange
//! is kept in a chat log.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────┐
//!   POST videos ─▶│   Catalog    │──enqueue──▶┌──────────────┐
//!                 └──────┬───────┘            │   Analysis   │──▶ segmentation
//!                        │                    │  worker pool │    service
//!                        ▼                    └──────┬───────┘
//!                 ┌──────────────┐                   │
//!                 │    SQLite    │◀──────────────────┘
//!                 └──────▲───────┘
//!                        │
//!   POST chat  ──▶┌──────┴───────┐
//!                 │  Retriever   │──▶ answering service
//!                 └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ytchat init
//! ytchat videos add "https://www.youtube.com/watch?v=abc123"
//! ytchat ask "what happens at the start?"
//! ytchat serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and reloadable snapshots |
//! | [`logging`] | Tracing subscriber setup |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite [`Store`](ytchat_core::store::Store) backend |
//! | [`capabilities`] | HTTP clients for metadata, segmentation, and answering |
//! | [`analysis`] | Background analysis queue and workers |
//! | [`catalog`] | Video registration, listing, removal |
//! | [`retrieval`] | Question answering and chat history |
//! | [`error`] | Caller-facing error type |
//! | [`server`] | JSON HTTP API |
//! | [`commands`] | CLI command implementations |

pub mod analysis;
pub mod capabilities;
pub mod catalog;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod migrate;
pub mod retrieval;
pub mod server;
pub mod sqlite_store;
