//! Query tool backed by a managed search index.
//!
//! The tool host registers an [`IndexQueryTool`]; every invocation opens a
//! fresh connection to the index through an [`IndexConnector`], so changes
//! made on the index side are visible to the very next query.

pub mod adapter;
pub mod error;
pub mod llama_cloud;
pub mod synthesis;
pub mod tool;

pub use adapter::{render_query, IndexConnector, ManagedIndex, QueryAdapterConfig};
pub use error::IndexError;
pub use llama_cloud::LlamaCloudConnector;
pub use synthesis::AnswerSynthesizer;
pub use tool::IndexQueryTool;
