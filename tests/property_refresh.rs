use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use wirebox::{Args, BeanBuilder, BeanError, Container, Dynamic, MapProperties};

// ===== Dynamic Property Refresh =====

struct RateLimiter {
    limit: Dynamic<u32>,
}

fn limiter_container(initial: &str, validate: Option<&str>) -> Container {
    let mut props = MapProperties::new();
    props.set("rate.limit", initial);

    let mut c = Container::new(props);
    let builder = BeanBuilder::factory(|_: &Args| {
        Ok(RateLimiter {
            limit: Dynamic::new(0),
        })
    });
    let builder = match validate {
        Some(expr) => {
            builder.refreshable_validated("rate.limit", expr, |r: &RateLimiter| r.limit.clone())
        }
        None => builder.refreshable("rate.limit", |r: &RateLimiter| r.limit.clone()),
    };
    c.register(builder).unwrap();
    c
}

#[test]
fn test_initial_bind_happens_during_wiring() {
    let mut c = limiter_container("4", None);
    c.refresh().unwrap();

    let limiter = c.get::<RateLimiter>().unwrap();
    assert_eq!(limiter.limit.get(), 4);
    c.close();
}

#[test]
fn test_refresh_applies_new_snapshot() {
    let mut c = limiter_container("4", None);
    c.refresh().unwrap();
    let limiter = c.get::<RateLimiter>().unwrap();

    let mut snapshot = MapProperties::new();
    snapshot.set("rate.limit", "9");
    c.refresh_properties(&snapshot).unwrap();
    assert_eq!(limiter.limit.get(), 9);
    c.close();
}

#[test]
fn test_validation_rejects_out_of_range_values() {
    let mut c = limiter_container("4", Some("$<6"));
    c.refresh().unwrap();
    let limiter = c.get::<RateLimiter>().unwrap();
    assert_eq!(limiter.limit.get(), 4);

    // in range
    let mut ok = MapProperties::new();
    ok.set("rate.limit", "5");
    c.refresh_properties(&ok).unwrap();
    assert_eq!(limiter.limit.get(), 5);

    // out of range: rejected, previous value survives
    let mut bad = MapProperties::new();
    bad.set("rate.limit", "6");
    match c.refresh_properties(&bad) {
        Err(BeanError::Refresh(msg)) => assert!(msg.contains("rate.limit")),
        other => panic!("expected refresh rejection, got {:?}", other.err()),
    }
    assert_eq!(limiter.limit.get(), 5);
    c.close();
}

#[test]
fn test_initial_value_must_also_validate() {
    let mut c = limiter_container("6", Some("$<6"));
    assert!(c.refresh().is_err());
}

#[test]
fn test_rejected_batch_leaves_every_binding_untouched() {
    struct Tunables {
        workers: Dynamic<u32>,
        queue: Dynamic<u32>,
    }

    let mut props = MapProperties::new();
    props.set("app.workers", "2");
    props.set("app.queue", "100");

    let mut c = Container::new(props);
    c.register(
        BeanBuilder::factory(|_: &Args| {
            Ok(Tunables {
                workers: Dynamic::new(0),
                queue: Dynamic::new(0),
            })
        })
        .refreshable("app.workers", |t: &Tunables| t.workers.clone())
        .refreshable_validated("app.queue", "$<=1000", |t: &Tunables| t.queue.clone()),
    )
    .unwrap();

    c.refresh().unwrap();
    let t = c.get::<Tunables>().unwrap();

    // workers would have parsed fine, but the batch dies on queue
    let mut bad = MapProperties::new();
    bad.set("app.workers", "8");
    bad.set("app.queue", "5000");
    assert!(c.refresh_properties(&bad).is_err());
    assert_eq!(t.workers.get(), 2);
    assert_eq!(t.queue.get(), 100);
    c.close();
}

#[test]
fn test_absent_key_in_snapshot_keeps_current_value() {
    let mut c = limiter_container("4", None);
    c.refresh().unwrap();
    let limiter = c.get::<RateLimiter>().unwrap();

    c.refresh_properties(&MapProperties::new()).unwrap();
    assert_eq!(limiter.limit.get(), 4);
    c.close();
}

#[test]
fn test_update_hooks_observe_commits() {
    let mut c = limiter_container("4", None);
    c.refresh().unwrap();
    let limiter = c.get::<RateLimiter>().unwrap();

    let seen = Arc::new(AtomicU32::new(0));
    let seen2 = seen.clone();
    limiter.limit.on_update(move |v| {
        seen2.store(*v, Ordering::SeqCst);
    });

    let mut snapshot = MapProperties::new();
    snapshot.set("rate.limit", "7");
    c.refresh_properties(&snapshot).unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 7);
    c.close();
}

#[test]
fn test_concurrent_refreshes_serialize_into_whole_batches() {
    struct Tunables {
        workers: Dynamic<u32>,
        queue: Dynamic<u32>,
    }

    let mut props = MapProperties::new();
    props.set("app.workers", "1");
    props.set("app.queue", "1");

    let mut c = Container::new(props);
    c.register(
        BeanBuilder::factory(|_: &Args| {
            Ok(Tunables {
                workers: Dynamic::new(0),
                queue: Dynamic::new(0),
            })
        })
        .refreshable("app.workers", |t: &Tunables| t.workers.clone())
        .refreshable("app.queue", |t: &Tunables| t.queue.clone()),
    )
    .unwrap();

    c.refresh().unwrap();
    let t = c.get::<Tunables>().unwrap();

    let mut first = MapProperties::new();
    first.set("app.workers", "10");
    first.set("app.queue", "10");
    let mut second = MapProperties::new();
    second.set("app.workers", "20");
    second.set("app.queue", "20");

    std::thread::scope(|s| {
        s.spawn(|| c.refresh_properties(&first).unwrap());
        s.spawn(|| c.refresh_properties(&second).unwrap());
        // reads stay unblocked while both batches race
        s.spawn(|| {
            for _ in 0..1_000 {
                let w = t.workers.get();
                assert!(w == 1 || w == 10 || w == 20, "torn value {}", w);
            }
        });
    });

    // whichever batch committed last, it committed wholly
    let (w, q) = (t.workers.get(), t.queue.get());
    assert_eq!(w, q);
    assert!(w == 10 || w == 20);
    c.close();
}

#[test]
fn test_unparsable_value_rejects_the_batch() {
    let mut c = limiter_container("4", None);
    c.refresh().unwrap();
    let limiter = c.get::<RateLimiter>().unwrap();

    let mut bad = MapProperties::new();
    bad.set("rate.limit", "not-a-number");
    assert!(matches!(
        c.refresh_properties(&bad),
        Err(BeanError::Refresh(_))
    ));
    assert_eq!(limiter.limit.get(), 4);
    c.close();
}
