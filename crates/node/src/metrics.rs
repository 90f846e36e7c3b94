//! Prometheus metrics, compiled in with the `metrics` feature.

use once_cell::sync::Lazy;
use prometheus::{register_int_counter, register_int_gauge, IntCounter, IntGauge};

pub static FROZEN_HEIGHT: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("solidus_frozen_height", "Current frozen edge height")
        .expect("metric registration")
});

pub static FREEZES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("solidus_freezes_total", "Blocks frozen since start")
        .expect("metric registration")
});

pub static BLOCKS_REGISTERED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "solidus_blocks_registered_total",
        "Candidate blocks accepted into the unfrozen store"
    )
    .expect("metric registration")
});

pub static VOTES_REGISTERED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "solidus_votes_registered_total",
        "Block votes accepted into the tally"
    )
    .expect("metric registration")
});
