pub mod election;
pub mod node;
pub mod persist;
pub mod rpc;
pub mod signal;
pub mod state;
pub mod timer;

pub use node::{ApplyMsg, NodeStatus, Proposal, RaftNode};
pub use persist::{FilePersister, MemoryPersister, Persister};
pub use state::{PersistentState, RaftRole, RaftState};
