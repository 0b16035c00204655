//! Property tests for core invariants:
//! 1. Ratchet monotonicity — trailing stops may only tighten, never loosen.
//! 2. Cache round-trip — bars written to the historical data cache come back
//!    byte-identical (modulo float round-trip) on a fresh cache instance
//!    pointed at the same directory.

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use tempfile::TempDir;

use trendlab_core::domain::{Bar, Direction, Timeframe};
use trendlab_core::position::RatchetState;
use trendlab_core::data::HistoricalDataCache;

fn arb_stop_delta() -> impl Strategy<Value = f64> {
    (-50.0..50.0_f64).prop_map(|p| (p * 10_000.0).round() / 10_000.0)
}

proptest! {
    #[test]
    fn long_ratchet_never_loosens(
        initial in 0.9000..1.3000_f64,
        deltas in prop::collection::vec(arb_stop_delta(), 1..30),
    ) {
        let mut ratchet = RatchetState::with_initial_level(Direction::Buy, initial);
        let mut last = initial;
        for delta in deltas {
            let proposed = last + delta;
            let adopted = ratchet.apply(proposed);
            prop_assert!(adopted >= last, "long ratchet loosened: {adopted} < {last}");
            last = adopted;
        }
    }

    #[test]
    fn short_ratchet_never_loosens(
        initial in 0.9000..1.3000_f64,
        deltas in prop::collection::vec(arb_stop_delta(), 1..30),
    ) {
        let mut ratchet = RatchetState::with_initial_level(Direction::Sell, initial);
        let mut last = initial;
        for delta in deltas {
            let proposed = last + delta;
            let adopted = ratchet.apply(proposed);
            prop_assert!(adopted <= last, "short ratchet loosened: {adopted} > {last}");
            last = adopted;
        }
    }

    #[test]
    fn ratchet_first_proposal_always_adopted(
        direction_is_buy in prop::bool::ANY,
        proposed in 0.9000..1.3000_f64,
    ) {
        let direction = if direction_is_buy { Direction::Buy } else { Direction::Sell };
        let mut ratchet = RatchetState::new(direction);
        prop_assert_eq!(ratchet.current_level(), None);
        prop_assert_eq!(ratchet.apply(proposed), proposed);
    }
}

fn arb_bar_count() -> impl Strategy<Value = usize> {
    1usize..60
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn cache_round_trip_preserves_bar_count_and_prices(n in arb_bar_count()) {
        let dir = TempDir::new().unwrap();
        let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let bars: Vec<Bar> = (0..n)
            .map(|i| Bar {
                time: base + Duration::hours(i as i64),
                open: 1.1000 + i as f64 * 0.0001,
                high: 1.1010 + i as f64 * 0.0001,
                low: 1.0990 + i as f64 * 0.0001,
                close: 1.1000 + i as f64 * 0.0001,
                volume: 1000,
                spread: 2,
            })
            .collect();

        {
            let cache = HistoricalDataCache::open(dir.path()).unwrap();
            cache.write("EURUSD", Timeframe::H1, &bars).unwrap();
        }

        // A fresh cache instance over the same directory must see the same data.
        let reopened = HistoricalDataCache::open(dir.path()).unwrap();
        let fetched = reopened
            .get("EURUSD", Timeframe::H1, bars[0].time, bars[n - 1].time, true, false, false, None)
            .unwrap();

        prop_assert_eq!(fetched.len(), n);
        for (original, round_tripped) in bars.iter().zip(fetched.iter()) {
            prop_assert_eq!(original.time, round_tripped.time);
            prop_assert!((original.close - round_tripped.close).abs() < 1e-9);
        }
    }
}
