//! 面向字节流的文本读写
//!
//! 支持 UTF-8、UTF-16（大小端）和本地遗留编码，读取时按 BOM 或启发式策略识别编码，
//! 并统一行结束符。

pub mod config;
pub mod encoding;
pub mod error;
pub mod reader;
pub mod writer;

pub use config::MalformedPolicy;
pub use encoding::heuristic::{EncodingHeuristic, TextStatistics, Utf16Statistics};
pub use encoding::{ByteOrder, Encoding};
pub use error::{Result, TextError};
pub use reader::{Lines, StreamReader};
pub use writer::StreamWriter;
