#![doc(test(attr(deny(warnings))))]

//! Journal Core provides the admission and consistency layer of a
//! double-entry bookkeeping engine: entity registration under a
//! progressive-trust policy, transaction admission with deduplication,
//! metadata constraint checking, and derived-state invalidation.

pub mod config;
pub mod errors;
pub mod journal;
pub mod utils;

use std::sync::Once;

static INIT_TRACING: Once = Once::new();

/// Initializes global tracing and emits a startup info log.
pub fn init() {
    INIT_TRACING.call_once(|| {
        utils::init_tracing();
        tracing::info!("Journal Core tracing initialized.");
    });
}

#[cfg(test)]
mod tests {
    #[test]
    fn init_does_not_panic() {
        super::init();
    }
}
