pub mod rpc;
pub mod token_fetcher;

#[cfg(test)]
pub(crate) mod scripted;

pub use rpc::{ChainRpc, SolanaRpcClient};
pub use token_fetcher::TokenFetcher;
