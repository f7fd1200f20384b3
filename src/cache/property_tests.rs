//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the recency index, the container's capacity bound
//! and the key encoding against simple reference models.

use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::cache::{Cache, CacheBuilder, CacheKey, DefaultKeyCodec, KeyCodec, LruTracker};
use crate::config::EvictionMode;
use crate::loader::loader_fn;

// == Test Configuration ==
const TEST_TTL: Duration = Duration::from_secs(300);

// == Strategies ==
/// Small key space so operations collide often
fn small_key_strategy() -> impl Strategy<Value = String> {
    "[a-f]{1,2}"
}

#[derive(Debug, Clone)]
enum LruOp {
    Touch(String),
    Remove(String),
    Evict,
}

fn lru_op_strategy() -> impl Strategy<Value = LruOp> {
    prop_oneof![
        4 => small_key_strategy().prop_map(LruOp::Touch),
        1 => small_key_strategy().prop_map(LruOp::Remove),
        1 => Just(LruOp::Evict),
    ]
}

#[derive(Debug, Clone)]
enum CacheOp {
    Get(u8),
    Remove(u8),
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        4 => (0u8..12).prop_map(CacheOp::Get),
        1 => (0u8..12).prop_map(CacheOp::Remove),
    ]
}

// == Reference Model ==
/// Front = most recently used, back = least recently used
#[derive(Debug, Default)]
struct ModelLru {
    order: VecDeque<String>,
}

impl ModelLru {
    fn touch(&mut self, key: &str) {
        self.remove(key);
        self.order.push_front(key.to_string());
    }

    fn remove(&mut self, key: &str) -> bool {
        let before = self.order.len();
        self.order.retain(|k| k != key);
        before != self.order.len()
    }

    fn evict_oldest(&mut self) -> Option<String> {
        self.order.pop_back()
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // For any sequence of touches, removals and evictions, the tracker agrees
    // with the reference list on membership, order and eviction victims.
    #[test]
    fn prop_lru_matches_model(ops in prop::collection::vec(lru_op_strategy(), 1..80)) {
        let mut lru = LruTracker::new();
        let mut model = ModelLru::default();

        for op in ops {
            match op {
                LruOp::Touch(key) => {
                    lru.touch(&CacheKey::from(key.as_str()));
                    model.touch(&key);
                }
                LruOp::Remove(key) => {
                    prop_assert_eq!(lru.remove(&key), model.remove(&key));
                }
                LruOp::Evict => {
                    let evicted = lru.evict_oldest().map(|k| k.to_string());
                    prop_assert_eq!(evicted, model.evict_oldest());
                }
            }
            prop_assert_eq!(lru.len(), model.order.len());
        }

        let order: Vec<String> = lru.keys_by_recency().iter().map(|k| k.to_string()).collect();
        let expected: Vec<String> = model.order.iter().cloned().collect();
        prop_assert_eq!(order, expected);
    }

    // Distinct string pairs never share a key, equal pairs always do.
    #[test]
    fn prop_default_codec_is_injective(
        a in ("[#:a-c0-9]{0,4}", "[#:a-c0-9]{0,4}"),
        b in ("[#:a-c0-9]{0,4}", "[#:a-c0-9]{0,4}"),
    ) {
        let key_a = DefaultKeyCodec.encode(&a);
        let key_b = DefaultKeyCodec.encode(&b);
        prop_assert_eq!(key_a == key_b, a == b);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    // For any sequence of gets and removals on a bounded LRU cache, the
    // resident keys are exactly those the reference model keeps, and the
    // index never exceeds its capacity.
    #[test]
    fn prop_cache_capacity_and_residency(
        capacity in 1usize..5,
        ops in prop::collection::vec(cache_op_strategy(), 1..40),
    ) {
        let rt = runtime();
        let result: Result<(), TestCaseError> = rt.block_on(async {
            let cache = CacheBuilder::new(
                loader_fn(|p: &(u8,)| Ok::<_, String>(u32::from(p.0) * 2)),
                TEST_TTL,
            )
            .eviction(EvictionMode::Lru)
            .capacity(capacity)
            .build()
            .unwrap();
            let mut model = ModelLru::default();

            for op in ops {
                match op {
                    CacheOp::Get(k) => {
                        let value = cache.get((k,)).await.unwrap();
                        prop_assert_eq!(value, Ok(u32::from(k) * 2));
                        model.touch(&k.to_string());
                        while model.order.len() > capacity {
                            model.evict_oldest();
                        }
                    }
                    CacheOp::Remove(k) => {
                        let removed = cache.remove(&(k,)).await;
                        prop_assert_eq!(removed, model.remove(&k.to_string()));
                    }
                }
                prop_assert!(cache.len().await <= capacity);
                prop_assert_eq!(cache.len().await, model.order.len());
            }

            for k in 0u8..12 {
                let resident = model.order.contains(&k.to_string());
                prop_assert_eq!(cache.contains(&(k,)).await, resident);
            }
            Ok(())
        });
        result?;
    }

    // Every removal forces exactly one fresh load on the next get.
    #[test]
    fn prop_remove_forces_cold_load(ops in prop::collection::vec(cache_op_strategy(), 1..40)) {
        let rt = runtime();
        let result: Result<(), TestCaseError> = rt.block_on(async {
            let loads: Arc<Mutex<HashMap<u8, usize>>> = Arc::default();
            let total = Arc::new(AtomicUsize::new(0));
            let (loads_in, total_in) = (loads.clone(), total.clone());
            let cache: Cache<_> = CacheBuilder::new(
                loader_fn(move |p: &(u8,)| {
                    total_in.fetch_add(1, Ordering::SeqCst);
                    let mut loads = loads_in.lock().unwrap();
                    let n = loads.entry(p.0).or_insert(0);
                    *n += 1;
                    Ok::<_, String>(*n)
                }),
                TEST_TTL,
            )
            .build()
            .unwrap();
            let mut expected: HashMap<u8, usize> = HashMap::new();
            let mut resident: HashMap<u8, bool> = HashMap::new();

            for op in ops {
                match op {
                    CacheOp::Get(k) => {
                        if !resident.get(&k).copied().unwrap_or(false) {
                            *expected.entry(k).or_insert(0) += 1;
                            resident.insert(k, true);
                        }
                        let value = cache.get((k,)).await.unwrap();
                        prop_assert_eq!(value, Ok(expected[&k]));
                    }
                    CacheOp::Remove(k) => {
                        cache.remove(&(k,)).await;
                        resident.insert(k, false);
                    }
                }
            }

            let expected_total: usize = expected.values().sum();
            prop_assert_eq!(total.load(Ordering::SeqCst), expected_total);
            Ok(())
        });
        result?;
    }
}
