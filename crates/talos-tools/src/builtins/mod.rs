//! Builtins - Built-in tools
//!
//! A small set of tools every host can mount without external services:
//! - `echo`: returns its input (wiring checks, tests)
//! - `file_read`: read a file under a confined root
//! - `http_get`: fetch a URL with scheme/host safety guards

mod echo;
mod file;
mod http;

pub use echo::EchoTool;
pub use file::FileReadTool;
pub use http::HttpGetTool;
