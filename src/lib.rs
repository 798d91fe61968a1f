//! # docs-harness
//!
//! **A documentation ingestion, indexing, and hybrid-search library.**
//!
//! `docs-harness` crawls documentation sources (web sites, GitHub
//! repositories, local file trees), converts them into normalized text
//! documents, and indexes them in a single SQLite database combining FTS5
//! (keyword/BM25) and `sqlite-vec` (semantic/KNN) search, fused via
//! reciprocal-rank fusion.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌───────────────┐   ┌──────────┐
//! │ Fetchers  │──▶│  Pipelines   │──▶│  Strategies    │──▶│  Store   │
//! │ HTTP/File │   │ HTML/MD/Text │   │ Web/GitHub/FS  │   │ FTS+Vec  │
//! └───────────┘   └──────────────┘   └───────┬────────┘   └────┬─────┘
//!                                             │                 │
//!                                    ┌────────▼───────┐   ┌─────▼──────┐
//!                                    │  Job Pipeline  │──▶│  Search    │
//!                                    │  (scheduler)   │   │  Service   │
//!                                    └────────────────┘   └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types: `Library`, `Version`, `Document` |
//! | [`error`] | The closed error taxonomy |
//! | [`charset`] | Charset detection/decoding for fetched bytes |
//! | [`fetcher`] | Fetchers: HTTP (with redirects/retry) and local files |
//! | [`pipeline`] | Content pipelines: HTML, Markdown, plain text |
//! | [`strategy`] | Scraper strategies: shared BFS driver, Web, GitHub, local FS |
//! | [`embedding`] | Embedding provider trait and OpenAI implementation |
//! | [`store`] | The SQLite document store: schema, writes, hybrid search |
//! | [`job`] | The job pipeline: bounded-concurrency crawl scheduler |
//! | [`search_service`] | The facade tying the store and job pipeline together |
//!
//! ## Configuration
//!
//! `docs-harness` is configured via a TOML file (default: `config/dh.toml`).
//! See [`config`] for all available options and [`config::load_config`] for
//! validation rules.

pub mod charset;
pub mod config;
pub mod embedding;
pub mod error;
pub mod fetcher;
pub mod job;
pub mod models;
pub mod pipeline;
pub mod search_service;
pub mod store;
pub mod strategy;
