//! `tb-domain`: shared types for toolbridge: conversation messages, tool
//! calls and definitions, streaming events, configuration, and the common
//! error type.

pub mod config;
pub mod error;
pub mod stream;
pub mod tool;
