//! The consensus loop: a single cooperative task that produces, votes,
//! freezes, and fetches.
//!
//! All consensus state lives here, owned by value and mutated only between
//! ticks. Inbound messages arrive through a bounded channel and are applied
//! in arrival order; the only blocking side effect is the store write inside
//! a freeze, which completes within the iteration.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;

use solidus_crypto::SignerIdentity;
use solidus_ledger::admission::{approved_transactions, AdmissionContext};
use solidus_ledger::{execute_block, Block, Identifier};

use crate::config::NodeCfg;
use crate::frozen_chain::{FreezeError, FrozenChain};
use crate::message::{Message, MessageContent};
use crate::score;
use crate::status::{StatusHandle, StatusSnapshot};
use crate::tx_pool::TxPool;
use crate::unfrozen::{RegisterError, UnfrozenStore};
use crate::votes::VoteTallier;

#[inline]
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Outbound responsibilities delegated to the network layer: broadcast what
/// we sign, fetch what we miss.
pub trait Outbound: Send {
    fn broadcast_block(&mut self, block: &Block);
    fn broadcast_vote(&mut self, height: u64, hash: [u8; 32]);
    fn request_block(&mut self, height: u64, hash: [u8; 32]);
}

/// For nodes running without a network layer, and for tests that only care
/// about state transitions.
pub struct NoOutbound;

impl Outbound for NoOutbound {
    fn broadcast_block(&mut self, _block: &Block) {}
    fn broadcast_vote(&mut self, _height: u64, _hash: [u8; 32]) {}
    fn request_block(&mut self, _height: u64, _hash: [u8; 32]) {}
}

pub struct ConsensusLoop {
    chain: FrozenChain,
    unfrozen: UnfrozenStore,
    votes: VoteTallier,
    pool: TxPool,
    identity: SignerIdentity,
    outbound: Box<dyn Outbound>,
    cfg: NodeCfg,
    status: StatusHandle,
    shutdown: Arc<AtomicBool>,
    /// Last vote we broadcast, to avoid re-sending every tick.
    last_broadcast_vote: Option<(u64, [u8; 32])>,
    /// Heights we already produced a block for.
    produced: HashSet<u64>,
    /// Fetches already issued, at most once per (height, hash).
    requested: HashSet<(u64, [u8; 32])>,
}

impl ConsensusLoop {
    pub fn new(
        chain: FrozenChain,
        identity: SignerIdentity,
        outbound: Box<dyn Outbound>,
        cfg: NodeCfg,
    ) -> Self {
        let pool = TxPool::new(cfg.tx_pool_capacity);
        Self {
            chain,
            unfrozen: UnfrozenStore::new(),
            votes: VoteTallier::new(),
            pool,
            identity,
            outbound,
            cfg,
            status: StatusHandle::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
            last_broadcast_vote: None,
            produced: HashSet::new(),
            requested: HashSet::new(),
        }
    }

    pub fn status_handle(&self) -> StatusHandle {
        self.status.clone()
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn chain(&self) -> &FrozenChain {
        &self.chain
    }

    pub fn chain_mut(&mut self) -> &mut FrozenChain {
        &mut self.chain
    }

    pub fn votes(&self) -> &VoteTallier {
        &self.votes
    }

    pub fn unfrozen(&self) -> &UnfrozenStore {
        &self.unfrozen
    }

    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }

    /// The height the node is currently trying to freeze.
    fn working_height(&self) -> u64 {
        self.chain.frozen_height().map(|h| h + 1).unwrap_or(0)
    }

    fn committee(&self) -> Option<HashSet<Identifier>> {
        if self.chain.in_genesis_cycle() {
            None
        } else {
            Some(self.chain.current_cycle().into_iter().collect())
        }
    }

    /// Apply one validated inbound message.
    pub fn handle_message(&mut self, message: Message, now: i64) {
        match message.content {
            MessageContent::Transaction(tx) => {
                self.pool.add(tx);
            }
            MessageContent::NewBlock(block) => {
                self.register_block(block, now);
            }
            MessageContent::BlockVote { height, hash } => {
                self.handle_vote(height, hash, message.sender, message.timestamp, now);
            }
            MessageContent::BlockVoteResponse => {}
            MessageContent::NodeJoinV2(_) => {
                // Peer directory concern; nothing for the core to do.
            }
        }
    }

    fn register_block(&mut self, block: Block, now: i64) {
        let height = block.height;
        let parent_height = height.checked_sub(1);
        let parent_hash = block.previous_block_hash;
        let (leader, _) = self.votes.leading_hash(height, self.committee().as_ref());
        match self.unfrozen.register(block, &self.chain, leader, now) {
            Ok(()) => {
                #[cfg(feature = "metrics")]
                crate::metrics::BLOCKS_REGISTERED.inc();
            }
            Err(RegisterError::MissingParent) => {
                // Candidate chains forward from something we lack; fetch it.
                if let Some(ph) = parent_height {
                    self.request_once(ph, parent_hash);
                }
            }
            Err(e) => {
                log::debug!("rejected candidate at height {height}: {e}");
            }
        }
    }

    fn handle_vote(
        &mut self,
        height: u64,
        hash: [u8; 32],
        voter: Identifier,
        message_timestamp: i64,
        now: i64,
    ) {
        if now - message_timestamp > self.cfg.vote_staleness_ms {
            return;
        }
        // Only cycle members vote, except in the Genesis era when the
        // committee is still forming.
        if !self.chain.in_genesis_cycle() && !self.chain.cycle_contains(&voter) {
            log::debug!("vote from non-cycle voter {} dropped", voter.short_hex());
            return;
        }
        match self.chain.frozen_height() {
            None => {
                if height != 0 {
                    return;
                }
            }
            Some(frozen) => {
                let open = self.chain.open_edge_height(now);
                if height <= frozen || height > open {
                    return;
                }
            }
        }
        match self.votes.register_vote(height, voter, hash, now) {
            Ok(()) => {
                #[cfg(feature = "metrics")]
                crate::metrics::VOTES_REGISTERED.inc();
            }
            Err(e) => {
                log::debug!("vote from {} rejected: {e}", voter.short_hex());
            }
        }
    }

    /// One fixed-step iteration: produce, vote, freeze, fetch, publish.
    pub fn step(&mut self, now: i64) {
        self.try_produce(now);
        self.cast_vote(now);
        self.try_freeze(now);
        self.request_missing(now);
        self.publish_status(now);
    }

    fn try_produce(&mut self, now: i64) {
        let Some(frozen) = self.chain.frozen_height() else {
            return;
        };
        let height = frozen + 1;
        if self.produced.contains(&height) {
            return;
        }
        if self.chain.next_scheduled_signer() != Some(Identifier(self.identity.identifier())) {
            return;
        }
        let slot_start = self.chain.slot_start(height);
        if now < slot_start + self.cfg.production_delay_ms {
            return;
        }
        let (Some(parent_block), Some(parent_snapshot)) =
            (self.chain.frozen_block(), self.chain.frozen_snapshot())
        else {
            return;
        };
        let version = parent_snapshot.blockchain_version;

        let ctx = AdmissionContext {
            parent_block,
            parent_snapshot,
            chain: &self.chain,
            params: self.chain.params(),
            genesis_start: self.chain.genesis_start(),
            version,
            for_assembly: true,
        };
        let txs = approved_transactions(self.pool.candidates(), &ctx);

        let snapshot = match execute_block(
            parent_snapshot,
            parent_block,
            &txs,
            Identifier(self.identity.identifier()),
            version,
            self.chain.cycle_threshold(),
            self.chain.params(),
        ) {
            Ok(s) => s,
            Err(e) => {
                // Admission should make this unreachable; do not ship a block
                // we cannot explain.
                log::error!("execution of own proposal failed at height {height}: {e}");
                return;
            }
        };

        let slack = self.chain.params().open_edge_slack_ms;
        let verification_timestamp = now.clamp(slot_start, slot_start + slack);
        let block = Block::new_signed(
            version,
            height,
            self.chain.frozen_hash().unwrap_or([0u8; 32]),
            self.chain.genesis_start(),
            verification_timestamp,
            txs,
            snapshot.hash(),
            &self.identity,
        );

        log::info!(
            "produced block {} at height {height} with {} transactions",
            hex::encode(&block.hash()[..4]),
            block.transactions.len()
        );
        self.produced.insert(height);
        self.outbound.broadcast_block(&block);
        self.register_block(block, now);
    }

    fn cast_vote(&mut self, now: i64) {
        let height = self.working_height();
        let committee = self.committee();
        let cycle_len = self.chain.cycle_length().max(1);

        let (leader, count) = self.votes.leading_hash(height, committee.as_ref());
        let choice = match leader {
            // Half the cycle already agrees and we hold the block: join in.
            Some(hash) if count * 2 >= cycle_len && self.unfrozen.lookup(height, &hash).is_some() => {
                Some(hash)
            }
            _ => self.best_votable_candidate(height, now),
        };
        let Some(hash) = choice else {
            return;
        };

        if self
            .votes
            .register_vote(height, Identifier(self.identity.identifier()), hash, now)
            .is_err()
        {
            // Our own flip is throttled like anyone else's.
            return;
        }
        let eligible = self.chain.in_genesis_cycle()
            || self.chain.cycle_contains(&Identifier(self.identity.identifier()));
        if eligible && self.last_broadcast_vote != Some((height, hash)) {
            self.outbound.broadcast_vote(height, hash);
            self.last_broadcast_vote = Some((height, hash));
        }
    }

    /// Lowest-score candidate whose vote delay has elapsed, ties toward the
    /// smaller hash.
    fn best_votable_candidate(&self, height: u64, now: i64) -> Option<[u8; 32]> {
        self.unfrozen
            .candidates_at(height)
            .filter(|c| score::minimum_vote_timestamp(c.first_seen_ms, c.score) <= now)
            .min_by(|a, b| {
                a.score
                    .cmp(&b.score)
                    .then_with(|| a.block.hash().cmp(&b.block.hash()))
            })
            .map(|c| c.block.hash())
    }

    fn try_freeze(&mut self, _now: i64) {
        let height = self.working_height();
        let committee = self.committee();
        let (Some(hash), count) = self.votes.leading_hash(height, committee.as_ref()) else {
            return;
        };
        if count < self.chain.cycle_threshold() {
            return;
        }
        let Some(candidate) = self.unfrozen.lookup(height, &hash) else {
            return;
        };
        let block = candidate.block.clone();
        let snapshot = candidate.snapshot.clone();

        let result = if self.chain.frozen_height().is_none() {
            self.chain.freeze_genesis(block, snapshot)
        } else {
            self.chain.freeze_block(block, snapshot)
        };
        match result {
            Ok(()) => {
                self.unfrozen.prune(height);
                self.votes.prune(height);
                self.pool.prune_before(self.chain.slot_start(height + 1));
                self.produced.retain(|h| *h > height);
                self.requested.retain(|(h, _)| *h > height);
                #[cfg(feature = "metrics")]
                {
                    crate::metrics::FREEZES_TOTAL.inc();
                    crate::metrics::FROZEN_HEIGHT.set(height as i64);
                }
            }
            Err(FreezeError::Store(e)) => {
                // Persistence trouble halts the frozen edge; everything else
                // keeps running and the freeze retries next tick.
                log::error!("store write failed while freezing height {height}: {e}");
            }
            Err(e) => {
                log::error!("refusing to freeze height {height}: {e}");
            }
        }
    }

    fn request_missing(&mut self, _now: i64) {
        let height = self.working_height();
        let committee = self.committee();
        let (Some(hash), _) = self.votes.leading_hash(height, committee.as_ref()) else {
            return;
        };
        if self.unfrozen.lookup(height, &hash).is_none() {
            self.request_once(height, hash);
        }
    }

    fn request_once(&mut self, height: u64, hash: [u8; 32]) {
        if self.requested.insert((height, hash)) {
            self.outbound.request_block(height, hash);
        }
    }

    fn publish_status(&self, now: i64) {
        self.status.publish(StatusSnapshot {
            frozen_height: self.chain.frozen_height(),
            frozen_hash: self.chain.frozen_hash().map(hex::encode),
            cycle_length: self.chain.cycle_length(),
            open_edge_height: self.chain.open_edge_height(now),
            tx_pool_len: self.pool.len(),
        });
    }

    /// Drive the loop until the shutdown flag flips. Messages drain before
    /// every step; on shutdown the channel drains up to its current depth and
    /// the loop returns.
    pub async fn run(mut self, mut inbox: mpsc::Receiver<Message>) {
        let mut ticker = tokio::time::interval(Duration::from_millis(self.cfg.tick_ms));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                while let Ok(message) = inbox.try_recv() {
                    self.handle_message(message, now_ms());
                }
                log::info!("consensus loop shut down");
                return;
            }
            ticker.tick().await;
            while let Ok(message) = inbox.try_recv() {
                self.handle_message(message, now_ms());
            }
            self.step(now_ms());
        }
    }
}
