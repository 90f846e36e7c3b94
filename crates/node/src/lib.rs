pub mod message;

pub mod store;

pub mod frozen_chain;

pub mod unfrozen;

pub mod votes;

pub mod score;

pub mod tx_pool;

pub mod status;

pub mod config;

pub mod consensus;

#[cfg(feature = "metrics")]
pub mod metrics;

pub use config::NodeCfg;

pub use consensus::{ConsensusLoop, Outbound};

pub use frozen_chain::{FreezeError, FrozenChain};

pub use message::{Message, MessageContent, MessageError};

pub use store::{BlockStore, MemoryStore, StoreError};

pub use unfrozen::{RegisterError, UnfrozenStore};

pub use votes::{VoteError, VoteTallier};
