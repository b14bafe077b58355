//! Ingestion adapters: a batch CSV+zstd reader and a streaming websocket
//! reader, both thin wrappers that push parsed trades onto an mpsc channel
//! for the worker pool (C8) to consume.

pub mod csv_reader;
pub mod websocket;
