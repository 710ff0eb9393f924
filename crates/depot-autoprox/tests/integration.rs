//! Integration tests for provisioning through the registry, the content
//! index and a live HTTP upstream.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use depot_autoprox::{
    AutoProxCatalog, AutoProxConfig, AutoProxResolver, AutoProxRule, HttpRemoteValidator, MatchExpression,
    RemoteValidator, RuleMapping, RuleResult, AUTOPROX_ORIGIN, METADATA_ORIGIN,
};
use depot_core::{ArtifactStore, Group, HostedRepository, RemoteRepository, StoreKey, MAVEN};
use depot_index::{attach, ContentIndex, ContentResolver, IndexConfig, MemoryContentSource};
use depot_registry::{Delivery, IfExists, StoreEvent, StoreRegistry, UpdateType};

/// Serves `HEAD` requests forever: 200 for paths under `ok_prefix`, 404 otherwise.
fn upstream(ok_prefix: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request_line = String::new();
            if reader.read_line(&mut request_line).is_err() {
                continue;
            }
            let mut line = String::new();
            while reader.read_line(&mut line).map(|n| n > 2).unwrap_or(false) {
                line.clear();
            }
            let path = request_line.split_whitespace().nth(1).unwrap_or("");
            let status = if path.starts_with(ok_prefix) {
                "200 OK"
            } else {
                "404 Not Found"
            };
            let _ = write!(stream, "HTTP/1.1 {status}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        }
    });
    format!("http://{addr}")
}

fn resolver_with(
    registry: &Arc<StoreRegistry>,
    catalog: AutoProxCatalog,
    validator: Arc<dyn RemoteValidator>,
) -> Arc<AutoProxResolver> {
    Arc::new(AutoProxResolver::new(
        Arc::clone(registry),
        Arc::new(catalog),
        validator,
        &AutoProxConfig {
            validation_timeout_ms: 2_000,
            ..AutoProxConfig::default()
        },
    ))
}

fn catalog(rules: &[(&str, &str)]) -> AutoProxCatalog {
    let catalog = AutoProxCatalog::with_rules(Vec::new());
    for (name, spec) in rules {
        catalog.store_rule(name, spec).unwrap();
    }
    catalog
}

fn upstream_rule(base: &str) -> String {
    format!(
        r#"
match = "/up-(\\w+)/"
[remote]
url = "{base}/${{1}}/"
[validation]
path = "/org/"
"#
    )
}

#[test]
fn deleting_a_member_prunes_it_from_groups() {
    let registry = StoreRegistry::in_memory();
    let h1 = StoreKey::hosted(MAVEN, "h1");
    let g1 = StoreKey::group(MAVEN, "g1");
    registry
        .create(HostedRepository::new(MAVEN, "h1").into(), IfExists::Fail)
        .unwrap();
    registry
        .create(Group::new(MAVEN, "g1", vec![h1.clone()]).into(), IfExists::Fail)
        .unwrap();

    let keys = |stores: Vec<Arc<ArtifactStore>>| stores.iter().map(|s| s.key().clone()).collect::<Vec<_>>();
    assert_eq!(keys(registry.ordered_concrete_stores(&g1, true)), vec![h1.clone()]);

    registry.delete(&h1).unwrap();
    assert!(registry.ordered_concrete_stores(&g1, true).is_empty());
    assert!(!registry.get(&g1).unwrap().constituents().unwrap().contains(&h1));
}

#[test]
fn specific_rule_wins_over_default() {
    let registry = Arc::new(StoreRegistry::in_memory());
    let catalog = catalog(&[
        ("temp", "match = \"temp-*\"\n[hosted]\nallow_snapshots = true\n"),
        ("fallback", "match = \"default\"\n[hosted]\n"),
    ]);
    let resolver = resolver_with(&registry, catalog, Arc::new(HttpRemoteValidator));

    let temp = resolver
        .get(&StoreKey::hosted(MAVEN, "temp-build-42"))
        .unwrap()
        .unwrap();
    assert!(temp.as_hosted().unwrap().allow_snapshots);

    let other = resolver
        .get(&StoreKey::hosted(MAVEN, "anything-else"))
        .unwrap()
        .unwrap();
    assert!(!other.as_hosted().unwrap().allow_snapshots);
    assert_eq!(other.metadata(METADATA_ORIGIN), Some(AUTOPROX_ORIGIN));
}

#[test]
fn reachable_upstream_is_provisioned() {
    let base = upstream("/central/org/");
    let registry = Arc::new(StoreRegistry::in_memory());
    let resolver = resolver_with(
        &registry,
        catalog(&[("upstreams", &upstream_rule(&base))]),
        Arc::new(HttpRemoteValidator),
    );

    let key = StoreKey::remote(MAVEN, "up-central");
    let store = resolver.get(&key).unwrap().unwrap();
    assert_eq!(store.as_remote().unwrap().url, format!("{base}/central/"));
    assert!(registry.contains(&key));
}

#[test]
fn unreachable_upstream_is_absent() {
    let base = upstream("/central/org/");
    let registry = Arc::new(StoreRegistry::in_memory());
    let resolver = resolver_with(
        &registry,
        catalog(&[("upstreams", &upstream_rule(&base))]),
        Arc::new(HttpRemoteValidator),
    );

    assert!(resolver.get(&StoreKey::remote(MAVEN, "up-missing")).unwrap().is_none());
    assert!(registry.is_empty());
}

#[test]
fn authoritative_store_answers_absence_without_probing() {
    let registry = Arc::new(StoreRegistry::in_memory());
    let index = Arc::new(ContentIndex::new(&IndexConfig::default()));
    attach(&registry, Arc::clone(&index));
    let source = Arc::new(MemoryContentSource::new());
    let resolver = resolver_with(&registry, catalog(&[]), Arc::new(HttpRemoteValidator));
    let content = ContentResolver::new(resolver, Arc::clone(&index), source.clone());

    let mut r1 = RemoteRepository::new(MAVEN, "r1", "https://r1.example.com/");
    r1.settings.authoritative_index = true;
    registry.create(r1.clone().into(), IfExists::Fail).unwrap();
    let key = StoreKey::remote(MAVEN, "r1");
    source.add(&key, "/p");

    assert_eq!(content.locate(&key, "/p").unwrap(), None);
    assert_eq!(source.probes(), 0);

    r1.settings.authoritative_index = false;
    registry.update(r1.into()).unwrap();
    assert_eq!(content.locate(&key, "/p").unwrap(), Some(key.clone()));
    assert_eq!(source.probes(), 1);
}

#[test]
fn concurrent_first_access_provisions_once() {
    const CALLERS: usize = 8;

    let registry = Arc::new(StoreRegistry::in_memory());
    let adds = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&adds);
    registry.subscribe(
        Arc::new(move |event: &StoreEvent| {
            if let StoreEvent::Updated(update) = event {
                if update.update_type == UpdateType::Add {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }
        }),
        Delivery::Inline,
    );

    let slow = |_: &RemoteRepository, _: &str, _: Duration| {
        thread::sleep(Duration::from_millis(50));
        true
    };
    let resolver = resolver_with(
        &registry,
        catalog(&[("upstreams", &upstream_rule("https://repo.example.com"))]),
        Arc::new(slow),
    );

    let barrier = Arc::new(Barrier::new(CALLERS));
    let key = StoreKey::remote(MAVEN, "up-shared");
    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let resolver = Arc::clone(&resolver);
            let barrier = Arc::clone(&barrier);
            let key = key.clone();
            thread::spawn(move || {
                barrier.wait();
                resolver.get(&key).unwrap().unwrap()
            })
        })
        .collect();
    let results: Vec<Arc<ArtifactStore>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(adds.load(Ordering::SeqCst), 1);
    assert_eq!(registry.len(), 1);
    assert!(results.iter().all(|s| Arc::ptr_eq(s, &results[0])));
}

#[test]
fn provisioned_group_strips_unresolvable_members() {
    let registry = Arc::new(StoreRegistry::in_memory());
    registry
        .create(HostedRepository::new(MAVEN, "local").into(), IfExists::Fail)
        .unwrap();
    let groups = r#"
match = "team-*"
[group]
constituents = ["hosted:local", "remote:nowhere-${1}"]
"#;
    let empty = r#"
match = "empty-*"
[group]
constituents = ["remote:nowhere-${1}"]
"#;
    let resolver = resolver_with(
        &registry,
        catalog(&[("groups", groups), ("empty", empty)]),
        Arc::new(HttpRemoteValidator),
    );

    let group = resolver.get(&StoreKey::group(MAVEN, "team-a")).unwrap().unwrap();
    assert_eq!(group.constituents().unwrap(), &[StoreKey::hosted(MAVEN, "local")]);

    assert!(resolver.get(&StoreKey::group(MAVEN, "empty-a")).unwrap().is_none());
    assert!(!registry.contains(&StoreKey::group(MAVEN, "empty-a")));
}

#[test]
fn panicking_rule_leaves_store_absent() {
    struct Explodes;
    impl AutoProxRule for Explodes {
        fn create_hosted(&self, _key: &StoreKey) -> RuleResult<HostedRepository> {
            panic!("rule bug");
        }
    }

    let registry = Arc::new(StoreRegistry::in_memory());
    let catalog = AutoProxCatalog::with_rules(vec![RuleMapping::new(
        "explodes",
        MatchExpression::Default,
        Arc::new(Explodes),
    )]);
    let resolver = resolver_with(&registry, catalog, Arc::new(HttpRemoteValidator));

    assert!(resolver.get(&StoreKey::hosted(MAVEN, "x")).unwrap().is_none());
    assert!(registry.is_empty());
}

#[test]
fn index_does_not_change_answers() {
    let group_rule = r#"
match = "build-*"
[group]
constituents = ["hosted:snapshots", "hosted:releases"]
"#;

    let answers = |enabled: bool| {
        let registry = Arc::new(StoreRegistry::in_memory());
        let index = Arc::new(ContentIndex::new(&IndexConfig { enabled }));
        attach(&registry, Arc::clone(&index));
        for name in ["snapshots", "releases"] {
            registry
                .create(HostedRepository::new(MAVEN, name).into(), IfExists::Fail)
                .unwrap();
        }
        let source = Arc::new(MemoryContentSource::new());
        source.add(&StoreKey::hosted(MAVEN, "releases"), "/a.pom");
        source.add(&StoreKey::hosted(MAVEN, "snapshots"), "/b.pom");
        source.add(&StoreKey::hosted(MAVEN, "releases"), "/b.pom");

        let resolver = resolver_with(&registry, catalog(&[("builds", group_rule)]), Arc::new(HttpRemoteValidator));
        let content = ContentResolver::new(resolver, index, source.clone());
        let group = StoreKey::group(MAVEN, "build-1");

        let mut out = Vec::new();
        for _ in 0..2 {
            for path in ["/a.pom", "/b.pom", "/c.pom"] {
                out.push(content.locate(&group, path).unwrap());
            }
        }
        source.remove(&StoreKey::hosted(MAVEN, "snapshots"), "/b.pom");
        out.push(content.locate(&group, "/b.pom").unwrap());
        out
    };

    assert_eq!(answers(true), answers(false));
}
