use std::sync::{Arc, Mutex};

use wirebox::{
    Args, BeanBuilder, BeanError, BeanStatus, Container, ContainerState, MapProperties, Selector,
};

// ===== Basic Registration and Wiring Tests =====

struct Config {
    url: String,
}

struct Repo {
    config: Arc<Config>,
}

struct Service {
    repo: Arc<Repo>,
}

#[test]
fn test_instance_and_factory_wiring() {
    let mut c = Container::new(MapProperties::new());
    c.register(BeanBuilder::instance(Config {
        url: "postgres://localhost".to_string(),
    }))
    .unwrap();
    c.register(
        BeanBuilder::factory(|args: &Args| {
            Ok(Repo {
                config: args.get::<Config>(0)?,
            })
        })
        .arg(Selector::of::<Config>()),
    )
    .unwrap();
    c.register(
        BeanBuilder::factory(|args: &Args| {
            Ok(Service {
                repo: args.get::<Repo>(0)?,
            })
        })
        .arg(Selector::of::<Repo>()),
    )
    .unwrap();

    c.refresh().unwrap();
    assert_eq!(c.state(), ContainerState::Refreshed);

    let service = c.get::<Service>().unwrap();
    assert_eq!(service.repo.config.url, "postgres://localhost");

    // same instance everywhere
    let repo = c.get::<Repo>().unwrap();
    assert!(Arc::ptr_eq(&service.repo, &repo));

    // every surviving bean ends up wired
    for (_, status) in c.bean_statuses() {
        assert_eq!(status, BeanStatus::Wired);
    }
    c.close();
}

#[test]
fn test_property_and_literal_arguments() {
    struct Server {
        port: u16,
        banner: String,
    }

    let mut props = MapProperties::new();
    props.set("server.port", "8080");

    let mut c = Container::new(props);
    c.register(
        BeanBuilder::factory(|args: &Args| {
            Ok(Server {
                port: args.value(0)?,
                banner: args.value(1)?,
            })
        })
        .arg_prop::<u16>("${server.port}")
        .arg_value("hello".to_string()),
    )
    .unwrap();

    c.refresh().unwrap();
    let server = c.get::<Server>().unwrap();
    assert_eq!(server.port, 8080);
    assert_eq!(server.banner, "hello");
    c.close();
}

#[test]
fn test_placeholder_default_used_when_key_missing() {
    struct Server {
        port: u16,
    }

    let mut c = Container::new(MapProperties::new());
    c.register(
        BeanBuilder::factory(|args: &Args| Ok(Server { port: args.value(0)? }))
            .arg_prop::<u16>("${server.port:=9090}"),
    )
    .unwrap();

    c.refresh().unwrap();
    assert_eq!(c.get::<Server>().unwrap().port, 9090);
    c.close();
}

#[test]
fn test_missing_required_property_fails_refresh() {
    struct Server {
        #[allow(dead_code)]
        port: u16,
    }

    let mut c = Container::new(MapProperties::new());
    c.register(
        BeanBuilder::factory(|args: &Args| Ok(Server { port: args.value(0)? }))
            .arg_prop::<u16>("${server.port}"),
    )
    .unwrap();

    match c.refresh() {
        Err(BeanError::Property(_)) => {}
        other => panic!("expected property error, got {:?}", other.err()),
    }
}

#[test]
fn test_nullable_argument_reads_as_none() {
    struct Optional;
    struct Holder {
        inner: Option<Arc<Optional>>,
    }

    let mut c = Container::new(MapProperties::new());
    c.register(
        BeanBuilder::factory(|args: &Args| {
            Ok(Holder {
                inner: args.get_opt::<Optional>(0)?,
            })
        })
        .arg_nullable(Selector::of::<Optional>()),
    )
    .unwrap();

    c.refresh().unwrap();
    assert!(c.get::<Holder>().unwrap().inner.is_none());
    c.close();
}

#[test]
fn test_missing_required_argument_reports_injection_path() {
    struct Missing;
    struct Holder {
        #[allow(dead_code)]
        inner: Arc<Missing>,
    }

    let mut c = Container::new(MapProperties::new());
    c.register(
        BeanBuilder::factory(|args: &Args| {
            Ok(Holder {
                inner: args.get::<Missing>(0)?,
            })
        })
        .arg(Selector::of::<Missing>()),
    )
    .unwrap();

    match c.refresh() {
        Err(BeanError::NotFound(msg)) => {
            assert!(msg.contains("Missing"), "path missing from: {}", msg);
            assert!(msg.contains("Holder"), "owner missing from: {}", msg);
        }
        other => panic!("expected not-found, got {:?}", other.err()),
    }
}

#[test]
fn test_indexed_option_arguments() {
    struct Extra;
    struct Target {
        extra: Option<Arc<Extra>>,
        missing: Option<Arc<Config>>,
    }

    let mut c = Container::new(MapProperties::new());
    c.register(BeanBuilder::instance(Extra)).unwrap();
    c.register(
        BeanBuilder::factory(|args: &Args| {
            Ok(Target {
                missing: args.get_opt::<Config>(0)?,
                extra: args.get_opt::<Extra>(2)?,
            })
        })
        .arg_at(2, Selector::of::<Extra>()),
    )
    .unwrap();

    c.refresh().unwrap();
    let t = c.get::<Target>().unwrap();
    assert!(t.extra.is_some());
    assert!(t.missing.is_none());
    c.close();
}

// ===== Explicit Dependencies =====

#[test]
fn test_depends_on_orders_construction() {
    struct Schema;
    struct Migrator;

    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let log_a = log.clone();
    let log_b = log.clone();

    let mut c = Container::new(MapProperties::new());
    // registered first, so wiring reaches it first; the edge must still put
    // Schema in front
    c.register(
        BeanBuilder::factory(move |_: &Args| {
            log_b.lock().unwrap().push("migrator");
            Ok(Migrator)
        })
        .depends_on(Selector::of::<Schema>()),
    )
    .unwrap();
    c.register(BeanBuilder::factory(move |_: &Args| {
        log_a.lock().unwrap().push("schema");
        Ok(Schema)
    }))
    .unwrap();

    c.refresh().unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["schema", "migrator"]);
    c.close();
}

#[test]
fn test_missing_depends_on_target_fails() {
    struct Lone;
    struct Ghost;

    let mut c = Container::new(MapProperties::new());
    c.register(BeanBuilder::instance(Lone).depends_on(Selector::of::<Ghost>()))
        .unwrap();

    assert!(matches!(c.refresh(), Err(BeanError::NotFound(_))));
}

// ===== Named Lookups and Container State =====

#[test]
fn test_named_registration_and_lookup() {
    let mut c = Container::new(MapProperties::new());
    c.register(
        BeanBuilder::instance(Config {
            url: "primary".to_string(),
        })
        .name("primary"),
    )
    .unwrap();
    c.register(
        BeanBuilder::instance(Config {
            url: "replica".to_string(),
        })
        .name("replica"),
    )
    .unwrap();

    c.refresh().unwrap();
    assert_eq!(c.get_named::<Config>("primary").unwrap().url, "primary");
    assert_eq!(c.get_named::<Config>("replica").unwrap().url, "replica");
    assert!(matches!(c.get::<Config>(), Err(BeanError::Ambiguous(_))));
    c.close();
}

#[test]
fn test_state_machine_rejects_out_of_phase_calls() {
    let mut c = Container::new(MapProperties::new());
    assert_eq!(c.state(), ContainerState::Default);

    // lookup before refresh
    assert!(matches!(c.get::<Config>(), Err(BeanError::State(_))));

    c.refresh().unwrap();

    // registration after refresh
    let err = c.register(BeanBuilder::instance(Config {
        url: String::new(),
    }));
    assert!(matches!(err, Err(BeanError::State(_))));

    // second refresh
    assert!(matches!(c.refresh(), Err(BeanError::State(_))));
    c.close();
}

#[test]
fn test_failed_refresh_reports_its_own_state_on_retry() {
    struct Broken;

    let mut c = Container::new(MapProperties::new());
    c.register(BeanBuilder::instance(Broken).init(|_| {
        Err(BeanError::Factory("bad state".to_string()))
    }))
    .unwrap();

    assert!(c.refresh().is_err());

    // a retry is rejected, and not with the "already refreshed" message
    match c.refresh() {
        Err(BeanError::State(msg)) => assert!(msg.contains("failed"), "got: {}", msg),
        other => panic!("expected state error, got {:?}", other.err()),
    }
}

#[test]
fn test_duplicate_identity_fails_refresh() {
    let mut c = Container::new(MapProperties::new());
    c.register(BeanBuilder::instance(Config { url: "a".into() }).name("db"))
        .unwrap();
    c.register(BeanBuilder::instance(Config { url: "b".into() }).name("db"))
        .unwrap();

    assert!(matches!(c.refresh(), Err(BeanError::Duplicate(_))));
}
