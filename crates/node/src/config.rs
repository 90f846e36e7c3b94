use solidus_ledger::BLOCK_DURATION_MS;

/// Runtime configuration for the consensus loop.
#[derive(Clone, Debug)]
pub struct NodeCfg {
    /// Fixed step of the consensus loop.
    pub tick_ms: u64,
    /// How long past a slot's start the local signer waits before producing,
    /// leaving room for the scheduled block to arrive off the wire.
    pub production_delay_ms: i64,
    /// Inbound message channel depth.
    pub channel_capacity: usize,
    /// Transaction pool capacity.
    pub tx_pool_capacity: usize,
    /// Votes whose envelope timestamp is older than this are dropped.
    pub vote_staleness_ms: i64,
}

impl Default for NodeCfg {
    fn default() -> Self {
        Self {
            tick_ms: 300,
            production_delay_ms: 0,
            channel_capacity: 1_024,
            tx_pool_capacity: crate::tx_pool::DEFAULT_CAPACITY,
            vote_staleness_ms: 4 * BLOCK_DURATION_MS,
        }
    }
}
