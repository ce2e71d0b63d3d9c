//! Response cache as seen through a sequence of server exchanges.

mod common;

use std::time::Duration;

use common::*;
use lwm2m_core::{Clock, CoapMessage, Code, ManualClock, Operation};
use lwm2m_exchange::{
    CacheLookup, ExchangeCache, ExchangeEvent, ExchangeState, TxParams, exchange_lifetime,
};

/// Answer a single-response read with message id `mid`.
fn serve(exchange: &mut TestExchange, mid: u16) {
    let (handlers, _record) = TestHandlers::new(b"v");
    let mut msg = peer_request(Operation::DmRead, mid, &[mid as u8]);
    exchange
        .new_server_request(Code::CONTENT, &mut msg, handlers.boxed(), 64)
        .unwrap();
    assert_eq!(
        exchange.process(ExchangeEvent::SendConfirmation, &mut msg),
        ExchangeState::Finished
    );
}

#[test]
fn oldest_entry_is_evicted_first() {
    let clock = ManualClock::new();
    let mut exchange = new_exchange(&clock);
    exchange.setup_cache(ExchangeCache::new(3).unwrap());

    for mid in 1..=4 {
        serve(&mut exchange, mid);
        clock.advance(Duration::from_secs(1));
    }

    let cache = exchange.cache().unwrap();
    assert_eq!(cache.recent_message_id(), Some(4));
    let mut older = cache.non_recent_message_ids();
    older.sort_unstable();
    assert_eq!(older, vec![2, 3]);

    assert_eq!(exchange.cache_check(1), CacheLookup::Miss);
    assert_eq!(exchange.cache_check(2), CacheLookup::HitNonRecent);
    assert_eq!(exchange.cache_check(3), CacheLookup::HitNonRecent);
    assert_eq!(exchange.cache_check(4), CacheLookup::HitRecent);

    let resent = exchange.cache_take_response().unwrap();
    assert_eq!(resent.message_id, 4);
    assert_eq!(resent.code, Code::CONTENT);
    assert_eq!(resent.payload, b"v");
}

#[test]
fn entries_outlive_the_exchange_but_not_its_lifetime() {
    let clock = ManualClock::new();
    let mut exchange = new_exchange(&clock);
    exchange.setup_cache(ExchangeCache::default());
    serve(&mut exchange, 0x0abc);

    let lifetime = exchange_lifetime(exchange.tx_params());
    clock.advance(lifetime);
    assert_eq!(exchange.cache_check(0x0abc), CacheLookup::HitRecent);

    clock.advance(Duration::from_millis(1));
    assert_eq!(exchange.cache_check(0x0abc), CacheLookup::Miss);
    assert_eq!(exchange.cache_take_response(), None);
}

#[test]
fn lifetime_follows_transmission_parameters() {
    let clock = ManualClock::new();
    let mut exchange = new_exchange(&clock);
    let params = TxParams::new(Duration::from_secs(1), 1.0, 1).unwrap();
    exchange.set_tx_params(params).unwrap();
    exchange.setup_cache(ExchangeCache::default());
    serve(&mut exchange, 5);

    // 1s * (2^1 - 1) * 1.0 + 2 * 100s + 1s
    assert_eq!(exchange_lifetime(&params), Duration::from_secs(202));
    clock.advance(Duration::from_secs(203));
    assert_eq!(exchange.cache_check(5), CacheLookup::Miss);
}

#[test]
fn attaching_a_cache_clears_it() {
    let clock = ManualClock::new();
    let mut exchange = new_exchange(&clock);
    exchange.setup_cache(ExchangeCache::default());
    serve(&mut exchange, 9);
    assert_eq!(exchange.cache_check(9), CacheLookup::HitRecent);

    let mut stale = CoapMessage::new(Operation::Response);
    stale.message_id = 9;
    let mut reused = ExchangeCache::default();
    reused.add(exchange.tx_params(), clock.now(), &stale);
    exchange.setup_cache(reused);
    assert_eq!(exchange.cache_check(9), CacheLookup::Miss);
}

#[test]
fn no_cache_means_no_hits() {
    let clock = ManualClock::new();
    let mut exchange = new_exchange(&clock);
    serve(&mut exchange, 1);
    assert_eq!(exchange.cache_check(1), CacheLookup::Miss);
    assert_eq!(exchange.cache_take_response(), None);
}

#[test]
fn huge_max_retransmit_still_caches_responses() {
    let clock = ManualClock::new();
    let mut exchange = new_exchange(&clock);
    let params = TxParams::new(Duration::from_secs(2), 1.5, 64).unwrap();
    exchange.set_tx_params(params).unwrap();
    exchange.setup_cache(ExchangeCache::default());

    serve(&mut exchange, 0x0777);
    assert_eq!(exchange_lifetime(exchange.tx_params()), Duration::MAX);

    // The entry is clamped far into the future rather than overflowing.
    clock.advance(Duration::from_secs(10 * 365 * 24 * 60 * 60));
    assert_eq!(exchange.cache_check(0x0777), CacheLookup::HitRecent);
    assert_eq!(
        exchange.cache_take_response().map(|m| m.message_id),
        Some(0x0777)
    );
}
