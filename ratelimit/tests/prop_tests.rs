//! Property tests for the rate limiter boundary and concurrent increments.

use std::sync::Arc;
use std::thread;

use idv_nullables::NullStore;
use idv_ratelimit::RateLimiter;
use idv_types::{RateLimitRule, RateLimitTable, RateLimitType, Timestamp, UserId};
use proptest::prelude::*;

fn limiter_with(rule: RateLimitRule) -> RateLimiter<NullStore> {
    let table = RateLimitTable {
        phone_confirmation: rule,
        ..RateLimitTable::default()
    };
    RateLimiter::new(Arc::new(NullStore::new()), table)
}

proptest! {
    /// Exactly `max` attempts inside one window succeed; the next one fails;
    /// once the window has passed since the last accepted attempt, it succeeds.
    #[test]
    fn boundary_holds_for_any_rule(
        max in 1u32..20,
        window in 1u64..10_000,
        start in 0u64..1_000_000,
        spacing in 0u64..10,
    ) {
        let kind = RateLimitType::PhoneConfirmation;
        let limiter = limiter_with(RateLimitRule::new(max, window));
        let user = UserId::new(1);

        // Spread attempts inside the window: each restarts it from the latest.
        let mut now = Timestamp::new(start);
        for _ in 0..max {
            prop_assert!(limiter.attempt(user, kind, now).is_ok());
            now = now.plus_secs(spacing.min(window - 1));
        }
        let last = now;
        prop_assert!(limiter.attempt(user, kind, last).unwrap_err().is_limited());

        let expires = limiter.expires_at(user, kind, last).unwrap().unwrap();
        prop_assert!(limiter.attempt(user, kind, expires).is_ok());
    }
}

#[test]
fn concurrent_attempts_never_exceed_max() {
    let limiter = limiter_with(RateLimitRule::new(5, 600));
    let user = UserId::new(3);
    let now = Timestamp::new(10);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let limiter = limiter.clone();
            thread::spawn(move || {
                (0..4)
                    .filter(|_| {
                        limiter
                            .attempt(user, RateLimitType::PhoneConfirmation, now)
                            .is_ok()
                    })
                    .count()
            })
        })
        .collect();

    let accepted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(accepted, 5);
}
