use chain_rpc::ChainRpcError;
use ledger_engine::LedgerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(#[from] LedgerError),
    #[error("Could not set up the chain RPC client. {0}")]
    ChainRpcError(#[from] ChainRpcError),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
}
