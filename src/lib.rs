//! # Syndex
//!
//! A content synchronization and search indexing pipeline.
//!
//! Syndex pulls canonical content from configured providers, detects
//! changes by content hash, persists them in transactional batches to
//! SQLite, and keeps an FTS5 search index in step via dirty-bit change
//! notifications over a message bus. Search requests are answered by a
//! strategy orchestrator with graceful fallback.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌────────┐   ┌─────────┐   ┌──────────┐
//! │ Providers │──▶│ Detect │──▶│ Persist │──▶│  SQLite   │
//! │ (fixture) │   │ (hash) │   │ (chunks)│   │ contents  │
//! └───────────┘   └────────┘   └────┬────┘   └──────────┘
//!                                   │ changed ids
//!                                   ▼
//!                             ┌──────────┐   ┌──────────┐
//!                             │   Bus    │──▶│ Consumer │──▶ FTS5 index
//!                             └──────────┘   └──────────┘
//!                                                 ▲
//!                            Search ──▶ Orchestrator ──▶ strategies
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! syndex init                     # create database
//! syndex sync                     # fetch, detect, persist, index
//! syndex search "rust async"      # keyword search
//! syndex rescore                  # refresh decayed freshness scores
//! syndex batches                  # recent sync run audit records
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`hash`] | Canonical content hashing |
//! | [`score`] | Content scoring |
//! | [`detect`] | Hash-based change detection |
//! | [`batch`] | Sync run audit records |
//! | [`provider`] | Content provider abstraction |
//! | [`persist`] | Bulk persistence gateway |
//! | [`bus`] | Message bus abstraction |
//! | [`notify`] | Change notifier |
//! | [`consumer`] | Index consumer |
//! | [`backend`] | Search backend abstraction |
//! | [`orchestrator`] | Search strategy orchestration |
//! | [`pipeline`] | End-to-end sync pipeline |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod backend;
pub mod backend_sqlite;
pub mod batch;
pub mod bus;
pub mod config;
pub mod consumer;
pub mod db;
pub mod detect;
pub mod error;
pub mod hash;
pub mod migrate;
pub mod models;
pub mod notify;
pub mod orchestrator;
pub mod persist;
pub mod pipeline;
pub mod provider;
pub mod query;
pub mod score;
pub mod store;
pub mod store_memory;
pub mod store_sqlite;
