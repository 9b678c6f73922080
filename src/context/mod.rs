//! Personal documents and the bounded context text built from them.

pub mod cache;
pub mod detection;
pub mod documents;
pub mod processor;

pub use cache::{DocumentContextCache, NO_DOCUMENTS_FALLBACK};
pub use detection::{DocumentKind, detect_document_type};
pub use documents::{Document, DocumentLibrary, DocumentSource, NewDocument, SourceFuture};
pub use processor::{DocumentProcessor, ProcessedDocument};
