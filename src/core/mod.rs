//! Core signal-table functionality
//!
//! This module contains the signal table and its tracks, element types,
//! chromosome naming, the chain parser, text input, configuration and the
//! worker pool.

pub mod assembly;
pub mod chain;
pub mod config;
pub mod dialect;
pub mod element;
mod error;
pub mod io;
mod ops;
pub mod pool;
pub mod smoothing;
mod strand;
pub mod table;
pub mod track;

pub use assembly::Assembly;
pub use chain::{
    parse_chain_bytes, parse_chain_file, parse_chain_reader, Chain, ChainBlock, ChainHeader,
    ChainParseError, ChainParseErrorKind, ChainStep,
};
pub use config::EngineConfig;
pub use dialect::{natural_sort, ChromDialect, ChromTranslator};
pub use element::{Dtype, Element};
pub use error::{EngineError, RecordError, Result};
pub use io::{detect_compression, open_text, InputCompression, PlainInput, RecordLines};
pub use ops::{masked_div, BinaryOp, ChromOrder, Operand};
pub use pool::{split_bounds, CancellationToken, WorkerPool, POLL_STRIDE};
pub use smoothing::gaussian_filter1d;
pub use strand::Strand;
pub use table::{AnySignalTable, Layout, SignalTable, TableMeta};
pub use track::Track;
