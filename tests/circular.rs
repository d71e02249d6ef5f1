use std::sync::Arc;

use wirebox::{Args, BeanBuilder, BeanError, Container, Lazy, MapProperties, Selector};

// ===== Circular Dependency Detection =====

struct ServiceA {
    #[allow(dead_code)]
    b: Arc<ServiceB>,
}

struct ServiceB {
    #[allow(dead_code)]
    a: Arc<ServiceA>,
}

#[test]
fn test_two_bean_cycle_fails_with_path() {
    let mut c = Container::new(MapProperties::new());
    c.register(
        BeanBuilder::factory(|args: &Args| {
            Ok(ServiceA {
                b: args.get::<ServiceB>(0)?,
            })
        })
        .arg(Selector::of::<ServiceB>()),
    )
    .unwrap();
    c.register(
        BeanBuilder::factory(|args: &Args| {
            Ok(ServiceB {
                a: args.get::<ServiceA>(0)?,
            })
        })
        .arg(Selector::of::<ServiceA>()),
    )
    .unwrap();

    match c.refresh() {
        Err(BeanError::Circular(path)) => {
            // A -> B -> A
            assert_eq!(path.len(), 3);
            assert_eq!(path.first(), path.last());
            assert!(path[0].contains("ServiceA"));
            assert!(path[1].contains("ServiceB"));
        }
        other => panic!("expected circular error, got {:?}", other.err()),
    }
}

#[test]
fn test_self_reference_is_a_cycle() {
    struct Selfish {
        #[allow(dead_code)]
        me: Arc<Selfish>,
    }

    let mut c = Container::new(MapProperties::new());
    c.register(
        BeanBuilder::factory(|args: &Args| {
            Ok(Selfish {
                me: args.get::<Selfish>(0)?,
            })
        })
        .arg(Selector::of::<Selfish>()),
    )
    .unwrap();

    assert!(matches!(c.refresh(), Err(BeanError::Circular(_))));
}

#[test]
fn test_three_bean_cycle_reports_full_chain() {
    struct A {
        #[allow(dead_code)]
        b: Arc<B>,
    }
    struct B {
        #[allow(dead_code)]
        c: Arc<C>,
    }
    struct C {
        #[allow(dead_code)]
        a: Arc<A>,
    }

    let mut c = Container::new(MapProperties::new());
    c.register(
        BeanBuilder::factory(|args: &Args| Ok(A { b: args.get::<B>(0)? }))
            .arg(Selector::of::<B>()),
    )
    .unwrap();
    c.register(
        BeanBuilder::factory(|args: &Args| Ok(B { c: args.get::<C>(0)? }))
            .arg(Selector::of::<C>()),
    )
    .unwrap();
    c.register(
        BeanBuilder::factory(|args: &Args| Ok(C { a: args.get::<A>(0)? }))
            .arg(Selector::of::<A>()),
    )
    .unwrap();

    match c.refresh() {
        Err(BeanError::Circular(path)) => assert_eq!(path.len(), 4),
        other => panic!("expected circular error, got {:?}", other.err()),
    }
}

// ===== Lazy Cycle Breaking =====

struct LazyA {
    b: Lazy<ServiceB2>,
}

struct ServiceB2 {
    a: Arc<LazyA>,
}

#[test]
fn test_lazy_edge_breaks_the_cycle() {
    let mut c = Container::new(MapProperties::new());
    c.register(
        BeanBuilder::factory(|args: &Args| {
            Ok(LazyA {
                b: args.lazy::<ServiceB2>(0)?,
            })
        })
        .arg_lazy(Selector::of::<ServiceB2>()),
    )
    .unwrap();
    c.register(
        BeanBuilder::factory(|args: &Args| {
            Ok(ServiceB2 {
                a: args.get::<LazyA>(0)?,
            })
        })
        .arg(Selector::of::<LazyA>()),
    )
    .unwrap();

    c.refresh().unwrap();

    let a = c.get::<LazyA>().unwrap();
    let b = a.b.get().unwrap();
    assert!(Arc::ptr_eq(&b.a, &a));
    c.close();
}

#[test]
fn test_lazy_cell_is_empty_during_factory() {
    struct Standalone;
    struct Peeker {
        saw_empty: bool,
        target: Lazy<Standalone>,
    }

    let mut c = Container::new(MapProperties::new());
    c.register(
        BeanBuilder::factory(|args: &Args| {
            let target = args.lazy::<Standalone>(0)?;
            Ok(Peeker {
                saw_empty: target.try_get().is_none(),
                target,
            })
        })
        .arg_lazy(Selector::of::<Standalone>()),
    )
    .unwrap();
    c.register(BeanBuilder::instance(Standalone)).unwrap();

    c.refresh().unwrap();
    let p = c.get::<Peeker>().unwrap();
    assert!(p.saw_empty);
    assert!(p.target.try_get().is_some());
    c.close();
}

#[test]
fn test_lazy_reference_to_missing_bean_fails_refresh() {
    struct Ghost;
    struct Wants {
        #[allow(dead_code)]
        g: Lazy<Ghost>,
    }

    let mut c = Container::new(MapProperties::new());
    c.register(
        BeanBuilder::factory(|args: &Args| {
            Ok(Wants {
                g: args.lazy::<Ghost>(0)?,
            })
        })
        .arg_lazy(Selector::of::<Ghost>()),
    )
    .unwrap();

    assert!(matches!(c.refresh(), Err(BeanError::NotFound(_))));
}
