//! The query-answering core: retrieval, classification, planning, synthesis, verification and
//! the thread/memory management built on top of them (C5-C12). `orchestrator` is the crate's
//! single public entry point for answering a question end to end; the other modules are the
//! components it wires together and are exposed for the API layer and the evaluation harness to
//! call directly (e.g. to expose `/query/classify-chunks` as its own endpoint).

pub mod classify;
pub mod enrich;
pub mod memory;
pub mod orchestrator;
pub mod planner;
pub mod synthesize;
pub mod thread;
pub mod verify;

pub use orchestrator::{
    answer, memory_clear, memory_delete, memory_get, memory_stats, ChunkPresentation,
    QueryOptions, Response, SubquestionTraceOut,
};
