//! Response cache for answering retransmitted requests (RFC 7252 §4.5).
//!
//! The most recent response is kept whole so a duplicate of the request that
//! produced it can be answered verbatim. Older responses are remembered by
//! message id only, which is enough to drop their duplicates silently.
//! Every entry lives for one exchange lifetime.

use std::time::Instant;

use lwm2m_core::CoapMessage;

use crate::error::ExchangeError;
use crate::timing::{TxParams, deadline, exchange_lifetime};

/// Default number of cached responses (one recent, four by id only).
pub const DEFAULT_CACHE_ENTRIES: usize = 5;

/// Result of looking up an inbound message id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLookup {
    /// Duplicate of the request answered by the recent response; resend it.
    HitRecent,
    /// Duplicate of an older request; drop it.
    HitNonRecent,
    /// Not a known duplicate; process it.
    Miss,
}

#[derive(Debug, Clone)]
struct RecentEntry {
    response: CoapMessage,
    expires_at: Instant,
}

/// An older response remembered by message id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonRecentEntry {
    pub message_id: u16,
    pub expires_at: Instant,
}

impl NonRecentEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at < now
    }
}

/// Slot a demoted recent entry should be written to.
///
/// Free or expired slots win, in index order; otherwise the entry that
/// expires first is overwritten. `None` only when there are no slots.
pub fn pick_victim(slots: &[Option<NonRecentEntry>], now: Instant) -> Option<usize> {
    if let Some(free) = slots
        .iter()
        .position(|slot| slot.is_none_or(|entry| entry.is_expired(now)))
    {
        return Some(free);
    }
    slots
        .iter()
        .enumerate()
        .filter_map(|(index, slot)| slot.map(|entry| (index, entry.expires_at)))
        .min_by_key(|&(_, expires_at)| expires_at)
        .map(|(index, _)| index)
}

/// Cache of the responses sent by server-role exchanges.
#[derive(Debug, Clone)]
pub struct ExchangeCache {
    recent: Option<RecentEntry>,
    non_recent: Vec<Option<NonRecentEntry>>,
    handling_retransmission: bool,
}

impl ExchangeCache {
    /// A cache holding `entries` responses in total.
    pub fn new(entries: usize) -> Result<Self, ExchangeError> {
        if entries == 0 {
            return Err(ExchangeError::InvalidCacheCapacity);
        }
        Ok(Self {
            recent: None,
            non_recent: vec![None; entries - 1],
            handling_retransmission: false,
        })
    }

    /// Forget every entry.
    pub fn invalidate(&mut self) {
        self.recent = None;
        self.non_recent.iter_mut().for_each(|slot| *slot = None);
        self.handling_retransmission = false;
    }

    pub fn capacity(&self) -> usize {
        self.non_recent.len() + 1
    }

    /// Record a response that is about to be sent.
    pub fn add(&mut self, params: &TxParams, now: Instant, response: &CoapMessage) {
        let expires_at = deadline(now, exchange_lifetime(params));
        self.sweep(now);

        if let Some(previous) = self.recent.take()
            && let Some(index) = pick_victim(&self.non_recent, now)
        {
            tracing::trace!(
                mid = previous.response.message_id,
                slot = index,
                "cache: demoted recent response"
            );
            self.non_recent[index] = Some(NonRecentEntry {
                message_id: previous.response.message_id,
                expires_at: previous.expires_at,
            });
        }

        tracing::trace!(mid = response.message_id, "cache: stored response");
        self.recent = Some(RecentEntry {
            response: response.clone(),
            expires_at,
        });
    }

    /// Look up an inbound message id.
    ///
    /// A recent hit arms exactly one following [`take_response`](Self::take_response).
    pub fn check(&mut self, message_id: u16, now: Instant) -> CacheLookup {
        self.sweep(now);

        if self
            .recent
            .as_ref()
            .is_some_and(|entry| entry.response.message_id == message_id)
        {
            self.handling_retransmission = true;
            tracing::debug!(mid = message_id, "cache: retransmission of recent request");
            return CacheLookup::HitRecent;
        }
        if self
            .non_recent
            .iter()
            .flatten()
            .any(|entry| entry.message_id == message_id)
        {
            tracing::debug!(mid = message_id, "cache: retransmission of older request");
            return CacheLookup::HitNonRecent;
        }
        CacheLookup::Miss
    }

    /// The cached response to resend after a [`CacheLookup::HitRecent`].
    ///
    /// Returns `None` unless the preceding [`check`](Self::check) hit the
    /// recent entry; the hit is consumed either way.
    pub fn take_response(&mut self) -> Option<CoapMessage> {
        if !std::mem::take(&mut self.handling_retransmission) {
            return None;
        }
        self.recent.as_ref().map(|entry| entry.response.clone())
    }

    pub fn is_handling_retransmission(&self) -> bool {
        self.handling_retransmission
    }

    /// Message id of the recent entry, if any.
    pub fn recent_message_id(&self) -> Option<u16> {
        self.recent.as_ref().map(|entry| entry.response.message_id)
    }

    /// Ids of the older entries, in slot order.
    pub fn non_recent_message_ids(&self) -> Vec<u16> {
        self.non_recent
            .iter()
            .flatten()
            .map(|entry| entry.message_id)
            .collect()
    }

    fn sweep(&mut self, now: Instant) {
        if self
            .recent
            .as_ref()
            .is_some_and(|entry| entry.expires_at < now)
        {
            self.recent = None;
        }
        for slot in &mut self.non_recent {
            if slot.is_some_and(|entry| entry.is_expired(now)) {
                *slot = None;
            }
        }
    }
}

impl Default for ExchangeCache {
    fn default() -> Self {
        Self {
            recent: None,
            non_recent: vec![None; DEFAULT_CACHE_ENTRIES - 1],
            handling_retransmission: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use lwm2m_core::{Code, Operation};

    fn response(mid: u16) -> CoapMessage {
        let mut msg = CoapMessage::new(Operation::Response);
        msg.message_id = mid;
        msg.code = Code::CONTENT;
        msg.payload = vec![mid as u8; 4];
        msg
    }

    fn entry(mid: u16, expires_at: Instant) -> Option<NonRecentEntry> {
        Some(NonRecentEntry {
            message_id: mid,
            expires_at,
        })
    }

    #[test]
    fn zero_capacity_rejected() {
        assert!(matches!(
            ExchangeCache::new(0),
            Err(ExchangeError::InvalidCacheCapacity)
        ));
    }

    #[test]
    fn pick_victim_prefers_free_slot() {
        let now = Instant::now();
        let later = now + Duration::from_secs(10);
        let slots = [entry(1, later), None, entry(3, later)];
        assert_eq!(pick_victim(&slots, now), Some(1));
    }

    #[test]
    fn pick_victim_prefers_expired_over_valid() {
        let now = Instant::now();
        let slots = [
            entry(1, now + Duration::from_secs(1)),
            entry(2, now - Duration::from_secs(1)),
        ];
        assert_eq!(pick_victim(&slots, now), Some(1));
    }

    #[test]
    fn pick_victim_falls_back_to_earliest_expiry() {
        let now = Instant::now();
        let slots = [
            entry(1, now + Duration::from_secs(30)),
            entry(2, now + Duration::from_secs(10)),
            entry(3, now + Duration::from_secs(20)),
        ];
        assert_eq!(pick_victim(&slots, now), Some(1));
        assert_eq!(pick_victim(&[], now), None);
    }

    #[test]
    fn first_add_only_fills_recent() {
        let now = Instant::now();
        let mut cache = ExchangeCache::new(3).unwrap();
        cache.add(&TxParams::default(), now, &response(10));
        assert_eq!(cache.recent_message_id(), Some(10));
        assert!(cache.non_recent_message_ids().is_empty());
    }

    #[test]
    fn add_demotes_recent() {
        let now = Instant::now();
        let mut cache = ExchangeCache::new(3).unwrap();
        cache.add(&TxParams::default(), now, &response(10));
        cache.add(&TxParams::default(), now, &response(11));
        assert_eq!(cache.recent_message_id(), Some(11));
        assert_eq!(cache.non_recent_message_ids(), vec![10]);
        assert_eq!(cache.check(10, now), CacheLookup::HitNonRecent);
        assert_eq!(cache.check(11, now), CacheLookup::HitRecent);
        assert_eq!(cache.check(12, now), CacheLookup::Miss);
    }

    #[test]
    fn take_response_requires_recent_hit() {
        let now = Instant::now();
        let mut cache = ExchangeCache::default();
        cache.add(&TxParams::default(), now, &response(7));
        assert_eq!(cache.take_response(), None);

        assert_eq!(cache.check(7, now), CacheLookup::HitRecent);
        assert!(cache.is_handling_retransmission());
        assert_eq!(cache.take_response(), Some(response(7)));
        assert!(!cache.is_handling_retransmission());
        assert_eq!(cache.take_response(), None);
    }

    #[test]
    fn entries_expire_after_exchange_lifetime() {
        let params = TxParams::default();
        let now = Instant::now();
        let mut cache = ExchangeCache::default();
        cache.add(&params, now, &response(1));

        let edge = now + exchange_lifetime(&params);
        assert_eq!(cache.check(1, edge), CacheLookup::HitRecent);
        assert_eq!(
            cache.check(1, edge + Duration::from_millis(1)),
            CacheLookup::Miss
        );
        assert_eq!(cache.recent_message_id(), None);
    }

    #[test]
    fn expired_recent_is_not_demoted() {
        let params = TxParams::default();
        let now = Instant::now();
        let mut cache = ExchangeCache::default();
        cache.add(&params, now, &response(1));
        let later = now + exchange_lifetime(&params) + Duration::from_secs(1);
        cache.add(&params, later, &response(2));
        assert_eq!(cache.recent_message_id(), Some(2));
        assert!(cache.non_recent_message_ids().is_empty());
    }

    #[test]
    fn single_entry_cache_keeps_only_recent() {
        let now = Instant::now();
        let mut cache = ExchangeCache::new(1).unwrap();
        cache.add(&TxParams::default(), now, &response(1));
        cache.add(&TxParams::default(), now, &response(2));
        assert_eq!(cache.check(1, now), CacheLookup::Miss);
        assert_eq!(cache.check(2, now), CacheLookup::HitRecent);
    }

    #[test]
    fn invalidate_clears_everything() {
        let now = Instant::now();
        let mut cache = ExchangeCache::default();
        cache.add(&TxParams::default(), now, &response(1));
        cache.add(&TxParams::default(), now, &response(2));
        cache.check(2, now);
        cache.invalidate();
        assert_eq!(cache.check(1, now), CacheLookup::Miss);
        assert_eq!(cache.check(2, now), CacheLookup::Miss);
        assert_eq!(cache.take_response(), None);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn victim_is_earliest_expiry_when_all_valid(
                offsets in proptest::collection::vec(1u64..10_000, 1..8),
            ) {
                let now = Instant::now();
                let slots: Vec<_> = offsets
                    .iter()
                    .enumerate()
                    .map(|(i, off)| entry(i as u16, now + Duration::from_millis(*off)))
                    .collect();
                let victim = pick_victim(&slots, now).unwrap();
                let min = offsets.iter().min().unwrap();
                prop_assert_eq!(offsets[victim], *min);
                prop_assert_eq!(offsets.iter().position(|o| o == min), Some(victim));
            }

            #[test]
            fn last_capacity_adds_are_all_remembered(capacity in 1usize..8, extra in 0usize..8) {
                let now = Instant::now();
                let mut cache = ExchangeCache::new(capacity).unwrap();
                let total = capacity + extra;
                for mid in 0..total {
                    let at = now + Duration::from_millis(mid as u64);
                    cache.add(&TxParams::default(), at, &response(mid as u16));
                }
                let end = now + Duration::from_millis(total as u64);
                for mid in 0..total {
                    let lookup = cache.check(mid as u16, end);
                    if mid == total - 1 {
                        prop_assert_eq!(lookup, CacheLookup::HitRecent);
                    } else if mid + capacity >= total {
                        prop_assert_eq!(lookup, CacheLookup::HitNonRecent);
                    } else {
                        prop_assert_eq!(lookup, CacheLookup::Miss);
                    }
                }
            }
        }
    }
}
