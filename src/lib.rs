//! shardfs: presents a remote object store as a read-only local filesystem,
//! tuned for sequential, high-throughput training workloads.
//!
//! Shards are cached in fixed-size chunks inside a two-zone store:
//!   HOT (proven useful, LRU eviction) and PREFETCH (speculative, FIFO).
//! A priority worker pool performs ranged downloads, and a background
//! predictor watches the access stream to fetch upcoming shards before
//! they are opened.
//!
//! The kernel filesystem binding is an external collaborator; it calls into
//! [`fs::ShardFs`] for open/read/readdir/getattr and nothing else.

pub mod cache;
pub mod config;
pub mod fs;
pub mod predictor;
pub mod remote;
pub mod server;
pub mod transfer;
