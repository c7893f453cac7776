//! # Archivist
//!
//! Harvests digitized items (scanned newspapers, bulletins) from a remote
//! digital-library catalog into a local SQLite full-text index, and serves
//! ranked, faceted, paginated search with highlighted snippets.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌──────────┐   ┌──────────┐
//! │ Catalog  │──▶│  Fetcher  │──▶│  Loader  │──▶│  SQLite  │
//! │ (pages)  │   │ (+cache)  │   │          │   │  FTS5    │
//! └──────────┘   └───────────┘   └──────────┘   └────┬─────┘
//!                                                    │
//!                                 ┌──────────────────┤
//!                                 ▼                  ▼
//!                            ┌──────────┐      ┌──────────┐
//!                            │   CLI    │      │   HTTP   │
//!                            └──────────┘      └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`cache`] | Write-once artifact cache with single-flight fetches |
//! | [`http`] | HTTP client, retry with backoff, politeness throttle |
//! | [`catalog`] | Paginated collection listing |
//! | [`normalize`] | Text decoding and hyphenation repair |
//! | [`fetch`] | Per-item metadata, full text, thumbnail |
//! | [`store`] | Item persistence and ranked queries |
//! | [`index`] | Loading fetched items into the store |
//! | [`harvest`] | Harvest orchestration |
//! | [`snippet`] | Highlighted fragment extraction |
//! | [`search`] | Query service |
//! | [`server`] | HTTP search API |
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema setup |
//! | [`error`] | Error types |
//! | [`models`] | Core data types |

pub mod cache;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod fetch;
pub mod harvest;
pub mod http;
pub mod index;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod search;
pub mod server;
pub mod snippet;
pub mod store;
