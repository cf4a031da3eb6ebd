//! Source parsing: tree-sitter front-ends, symbol resolution and the
//! brace-language worker protocol

pub mod extractor;
pub mod frontend;
pub mod imports;
pub mod languages;
pub mod parser_pool;
pub mod resolver;
pub mod worker;

#[cfg(test)]
pub mod tests;

pub use extractor::{LanguageExtractor, SourceFile};
pub use frontend::Frontends;
pub use imports::{ImportEntry, ImportTable};
pub use languages::{PythonExtractor, TypeScriptExtractor};
pub use parser_pool::{ParseRequest, ParseResult, ParserPool, create_parser_pool};
pub use resolver::{Resolution, SymbolResolver};
pub use worker::{WorkerClient, WorkerError, WorkerRequest, WorkerResponse, serve_worker};
