// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BAKERPAY - CHAIN CLIENTS
//
// Concrete engine backends: ledger RPC + indexer (Collector), local and
// remote signers, and the dispatching transactor.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub mod collector;
pub mod indexer;
pub mod rpc;
pub mod signer;
pub mod transactor;

pub use collector::DefaultCollector;
pub use signer::{load_signer, InMemorySigner, RemoteSigner};
pub use transactor::DefaultTransactor;
