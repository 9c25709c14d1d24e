//! Scripted in-memory consensus nodes for exercising the client without a real network.

pub mod mock_network;
pub mod mock_node;
pub mod scenarios;

pub use mock_network::{MockLedger, MockNetwork};
pub use mock_node::{MockFault, MockNode, Scripted, Submission};
pub use scenarios::LocalScenario;
