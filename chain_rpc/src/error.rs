use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainRpcError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("No RPC endpoint is configured for chain {0}")]
    UnknownChain(u64),
    #[error("RPC request failed: {0}")]
    RequestError(String),
    #[error("RPC call failed. Error {status}. {message}")]
    HttpError { status: u16, message: String },
    #[error("RPC node returned error {code}: {message}")]
    NodeError { code: i64, message: String },
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Invalid hex quantity: {0}")]
    InvalidQuantity(String),
    #[error("The RPC node returned an empty result for {0}")]
    EmptyResponse(String),
}
