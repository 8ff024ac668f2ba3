use toolbridge_tool_runtime::ToolError;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The index could not be reached or refused the credential.
    #[error("Index connection failed: {0}")]
    AdapterConnection(String),
    /// Connected, but the query itself failed.
    #[error("Index query failed: {0}")]
    Query(String),
}

impl From<IndexError> for ToolError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::AdapterConnection(msg) => ToolError::AdapterConnection(msg),
            IndexError::Query(msg) => ToolError::ExecutionFailed(msg),
        }
    }
}
