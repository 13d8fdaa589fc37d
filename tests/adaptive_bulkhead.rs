use std::{
    sync::{Arc, Barrier, Mutex},
    thread,
    time::Duration,
};

use adaptive_bulkhead::adaptive_bulkhead::{AdaptiveBulkheadConfig, LimitChangeEvent, PermitPool};
use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use rand::Rng;

const FAST: Duration = Duration::from_millis(50);
const SLOW: Duration = Duration::from_millis(300);

fn reference_config() -> AdaptiveBulkheadConfig {
    AdaptiveBulkheadConfig::builder()
        .min_limit(5)
        .max_limit(50)
        .window_size(5)
        .window_time(Duration::from_secs(2))
        .failure_rate_threshold(50.0)
        .slow_call_rate_threshold(50.0)
        .slow_call_duration_threshold(Duration::from_millis(200))
        .build()
}

fn fixed_limit(limit: usize) -> AdaptiveBulkheadConfig {
    AdaptiveBulkheadConfig::builder()
        .min_limit(limit)
        .max_limit(limit)
        .build()
}

#[test]
fn reference_scenario() {
    let pool = PermitPool::new("test", reference_config()).unwrap();
    assert_eq!(pool.limit(), 5);

    for _ in 0..5 {
        assert!(pool.acquire_permission());
        pool.on_success(FAST).unwrap();
    }
    assert_eq!(pool.limit(), 6);

    for _ in 0..5 {
        assert!(pool.acquire_permission());
        pool.on_success(SLOW).unwrap();
    }
    assert_eq!(pool.limit(), 5);
}

#[test]
fn concurrent_acquires_grant_exactly_the_free_permits() {
    for (callers, limit, held) in [(32, 10, 0), (8, 20, 0), (50, 50, 0), (40, 16, 6)] {
        let pool = Arc::new(PermitPool::new("race", fixed_limit(limit)).unwrap());
        for _ in 0..held {
            assert!(pool.acquire_permission());
        }
        let free = limit - held;

        let barrier = Arc::new(Barrier::new(callers));
        let handles: Vec<_> = (0..callers)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    pool.acquire_permission()
                })
            })
            .collect();

        let granted = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|granted| *granted)
            .count();

        assert_eq!(granted, callers.min(free), "{callers} callers, {free} free");
        assert_eq!(pool.in_flight(), held + callers.min(free));
    }
}

#[test]
fn every_window_adjusts_the_limit_exactly_once() {
    const THREADS: usize = 8;
    const CALLS_PER_THREAD: usize = 100;
    const WINDOW_SIZE: usize = 10;

    let config = AdaptiveBulkheadConfig::builder()
        .min_limit(1)
        .max_limit(1000)
        .window_size(WINDOW_SIZE)
        .window_time(Duration::from_secs(3600))
        .slow_call_duration_threshold(Duration::from_secs(3600))
        .event_channel_capacity(1024)
        .build();
    let pool = Arc::new(PermitPool::new("windows", config).unwrap());
    let mut events = pool.events().subscribe();

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                let mut completed = 0;
                while completed < CALLS_PER_THREAD {
                    if !pool.acquire_permission() {
                        thread::yield_now();
                        continue;
                    }
                    assert!(pool.limit() <= 1000);
                    pool.on_success(FAST).unwrap();
                    completed += 1;
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let windows = THREADS * CALLS_PER_THREAD / WINDOW_SIZE;
    assert_eq!(pool.limit(), 1 + windows);
    assert_eq!(pool.in_flight(), 0);

    let mut changes = 0;
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.new_limit(), event.old_limit() + 1);
        changes += 1;
    }
    assert_eq!(changes, windows);
}

#[test]
fn concurrent_limit_changes_are_published_in_order() {
    const THREADS: usize = 8;
    const CALLS_PER_THREAD: usize = 50;

    for _ in 0..50 {
        let config = AdaptiveBulkheadConfig::builder()
            .min_limit(1)
            .max_limit(1000)
            .initial_limit(500)
            .window_size(1)
            .window_time(Duration::from_secs(3600))
            .slow_call_duration_threshold(Duration::from_secs(3600))
            .event_channel_capacity(THREADS * CALLS_PER_THREAD)
            .build();
        let pool = Arc::new(PermitPool::new("ordered", config).unwrap());
        let mut events = pool.events().subscribe();

        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let mut rng = rand::rng();
                    barrier.wait();
                    let mut completed = 0;
                    while completed < CALLS_PER_THREAD {
                        if !pool.acquire_permission() {
                            thread::yield_now();
                            continue;
                        }
                        pool.on_outcome(rng.random_bool(0.9), FAST).unwrap();
                        completed += 1;
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut previous = 500;
        let mut out_of_order = 0;
        while let Ok(event) = events.try_recv() {
            if event.old_limit() != previous {
                out_of_order += 1;
            }
            previous = event.new_limit();
        }
        assert_eq!(out_of_order, 0, "limit changes delivered out of order");
        assert_eq!(previous, pool.limit());
    }
}

#[test]
fn limit_stays_within_bounds_under_mixed_concurrent_load() {
    let config = AdaptiveBulkheadConfig::builder()
        .min_limit(3)
        .max_limit(12)
        .window_size(4)
        .failure_rate_threshold(50.0)
        .slow_call_rate_threshold(50.0)
        .slow_call_duration_threshold(Duration::from_millis(200))
        .build();
    let pool = Arc::new(PermitPool::new("mixed", config).unwrap());

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                let mut rng = rand::rng();
                for _ in 0..500 {
                    if pool.acquire_permission() {
                        let limit = pool.limit();
                        assert!((3..=12).contains(&limit), "limit {limit} out of bounds");
                        let duration = Duration::from_millis(rng.random_range(5..400));
                        pool.on_outcome(rng.random_bool(0.7), duration).unwrap();
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert!((3..=12).contains(&pool.limit()));
    assert_eq!(pool.in_flight(), 0);
    assert!(pool.release_permission().is_err());
}

#[tokio::test(start_paused = true)]
async fn random_latency_simulation() {
    let config = AdaptiveBulkheadConfig::builder()
        .min_limit(5)
        .max_limit(50)
        .window_size(5)
        .window_time(Duration::from_secs(2))
        .failure_rate_threshold(50.0)
        .slow_call_rate_threshold(50.0)
        .slow_call_duration_threshold(Duration::from_millis(200))
        .event_channel_capacity(4096)
        .build();
    let pool = Arc::new(PermitPool::new("test", config).unwrap());

    let seen: Arc<Mutex<Vec<LimitChangeEvent>>> = Arc::default();
    let subscription = pool.events().on_limit_change({
        let seen = Arc::clone(&seen);
        move |event| seen.lock().unwrap().push(event.clone())
    });

    let calls: Vec<_> = (0..1000)
        .map(|i| {
            let pool = Arc::clone(&pool);
            let latency = Duration::from_millis(rand::rng().random_range(5..400));
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(i % 50)).await;
                let Some(permit) = pool.try_acquire() else {
                    return false;
                };
                tokio::time::sleep(latency).await;
                permit.record(true).unwrap();
                true
            })
        })
        .collect();

    let mut completed = 0;
    for call in futures::future::join_all(calls).await {
        if call.unwrap() {
            completed += 1;
        }
    }
    assert!(completed >= 5);
    assert_eq!(pool.in_flight(), 0);

    for _ in 0..100 {
        tokio::task::yield_now().await;
    }
    subscription.unsubscribe();

    let seen = seen.lock().unwrap();
    let mut previous = 5;
    for event in seen.iter() {
        assert_eq!(event.old_limit(), previous);
        assert!((5..=50).contains(&event.new_limit()));
        previous = event.new_limit();
    }
    assert_eq!(previous, pool.limit());
}

#[test]
fn emits_limit_metrics() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        let pool = PermitPool::new("metered", reference_config()).unwrap();
        for _ in 0..5 {
            assert!(pool.acquire_permission());
            pool.on_success(FAST).unwrap();
        }
        for _ in 0..6 {
            assert!(pool.acquire_permission());
        }
        assert!(!pool.acquire_permission());
    });

    let metrics = snapshotter.snapshot().into_vec();
    let find = |name: &str| {
        metrics
            .iter()
            .filter(|(key, ..)| key.key().name() == name)
            .map(|(key, _, _, value)| (key.key().clone(), value.clone()))
            .collect::<Vec<_>>()
    };

    let limit = find("adaptive_bulkhead_limit");
    assert_eq!(limit.len(), 1);
    let (key, value) = &limit[0];
    assert!(
        key.labels()
            .any(|label| label.key() == "bulkhead" && label.value() == "metered")
    );
    assert!(matches!(value, DebugValue::Gauge(v) if v.0 == 6.0));

    let rejected = find("adaptive_bulkhead_calls_rejected_total");
    assert!(matches!(rejected.as_slice(), [(_, DebugValue::Counter(1))]));

    let changes = find("adaptive_bulkhead_limit_changes_total");
    assert_eq!(changes.len(), 2);
    for (key, value) in &changes {
        let increase = key
            .labels()
            .any(|label| label.key() == "direction" && label.value() == "increase");
        let expected = if increase { 1 } else { 0 };
        assert!(
            matches!(value, DebugValue::Counter(n) if *n == expected),
            "{key:?} = {value:?}"
        );
    }
}
