//! Integration tests for depcache

use depcache::{
    Address, BuildOptions, BuilderRegistry, Engine, EngineOptions, ExpiryPolicy, LoadError,
    Loader, RecordingSink,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Builders whose values change on every build
fn stamped() -> (BuilderRegistry<Value>, Arc<AtomicUsize>) {
    let builds = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&builds);
    let registry = BuilderRegistry::<Value>::new().with("random", move |address: Address, _| {
        let stamp = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(json!(format!(
                "{}:{}",
                address.get_str("name").unwrap_or_default(),
                stamp
            )))
        }
    });
    (registry, builds)
}

/// `lower` yields a fresh stamp per build, `upper` uppercases `lower`
fn lower_upper() -> (BuilderRegistry<Value>, Arc<AtomicUsize>) {
    let builds = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&builds);
    let registry = BuilderRegistry::<Value>::new()
        .with("lower", move |address: Address, _| {
            let stamp = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                let name = address.get_str("name").unwrap_or_default().to_lowercase();
                Ok(json!(format!("{} {}", name, stamp)))
            }
        })
        .with("upper", |address: Address, load: Loader<Value>| async move {
            let name = address.get_str("name").unwrap_or_default().to_string();
            let lower = load.load(&Address::new("lower").with("name", name)).await?;
            Ok(json!(lower.as_str().unwrap_or_default().to_uppercase()))
        });
    (registry, builds)
}

fn lower(name: &str) -> Address {
    Address::new("lower").with("name", name)
}

fn upper(name: &str) -> Address {
    Address::new("upper").with("name", name)
}

mod caching {
    use super::*;

    #[tokio::test]
    async fn concurrent_loads_share_one_build() {
        let (registry, builds) = stamped();
        let engine = Engine::new(registry);
        let address = Address::new("random").with("name", "a");

        let first = engine.load(&address).unwrap();
        let second = engine.load(&address).unwrap();
        let (a, b) = tokio::join!(first, second);

        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_tasks_share_one_build() {
        let (registry, builds) = stamped();
        let engine = Engine::new(registry);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move {
                    engine
                        .get(&Address::new("random").with("name", "shared"))
                        .await
                })
            })
            .collect();

        let mut values = Vec::new();
        for task in tasks {
            values.push(task.await.unwrap().unwrap());
        }

        assert!(values.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reuses_cached_values() {
        let (registry, _) = stamped();
        let engine = Engine::new(registry);
        let address = Address::new("random").with("name", "a");

        let first = engine.get(&address).await.unwrap();
        let second = engine.get(&address).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn structurally_equal_addresses_hit_same_entry() {
        let (registry, builds) = stamped();
        let engine = Engine::new(registry);

        let a = Address::new("random")
            .with("first", "Allain")
            .with("last", "Lalonde");
        let b = Address::from_value(json!({
            "last": "Lalonde",
            "type": "random",
            "first": "Allain"
        }))
        .unwrap();

        let first = engine.get(&a).await.unwrap();
        let second = engine.get(&b).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(engine.len(), 1);
    }

    #[tokio::test]
    async fn unknown_type_fails_without_caching() {
        let (registry, _) = stamped();
        let engine = Engine::new(registry);
        engine
            .get(&Address::new("random").with("name", "a"))
            .await
            .unwrap();
        let before = engine.len();

        let err = engine.load(&Address::new("missing")).unwrap_err();

        assert_eq!(err, LoadError::UnknownType("missing".to_string()));
        assert_eq!(engine.len(), before);
        assert!(!engine.contains(&Address::new("missing")));
    }

    #[tokio::test]
    async fn builders_compose() {
        let registry = BuilderRegistry::<Value>::new()
            .with("brick", |address: Address, _| async move {
                Ok(json!(format!("[{}]", address.get_str("name").unwrap_or_default())))
            })
            .with("wall", |address: Address, load: Loader<Value>| async move {
                let a = load.load(&Address::new("brick").with("name", "a")).await?;
                let b = load.load(&Address::new("brick").with("name", "b")).await?;
                Ok(json!(format!(
                    "{} {} {}",
                    address.get_str("name").unwrap_or_default(),
                    a.as_str().unwrap_or_default(),
                    b.as_str().unwrap_or_default()
                )))
            });
        let engine = Engine::new(registry);

        let wall = engine
            .get(&Address::new("wall").with("name", "WALL"))
            .await
            .unwrap();
        assert_eq!(wall, json!("WALL [a] [b]"));
        assert_eq!(engine.len(), 3);
    }

    #[tokio::test]
    async fn offer_after_construction() {
        let engine: Engine = Engine::default();
        assert!(engine.load(&Address::new("late")).is_err());

        engine.offer("late", |_, _| async { Ok(json!("arrived")) });
        assert!(engine.has_builder("late"));
        assert_eq!(
            engine.get(&Address::new("late")).await.unwrap(),
            json!("arrived")
        );
    }

    #[tokio::test]
    async fn kind_handle_fills_type() {
        let registry = BuilderRegistry::<Value>::new()
            .with("echo", |address: Address, _| async move { Ok(address.to_value()) });
        let engine = Engine::new(registry);

        let echo = engine.kind("echo");
        let value = echo.get(json!({"name": "test"})).await.unwrap();
        assert_eq!(value, json!({"type": "echo", "name": "test"}));

        assert!(echo.get(json!("not an object")).await.is_err());
        assert_eq!(echo.invalidate(json!({"name": "test"})).unwrap().len(), 1);
    }
}

mod invalidation {
    use super::*;

    #[tokio::test]
    async fn explicit_invalidation_forces_rebuild() {
        let (registry, _) = stamped();
        let engine = Engine::new(registry);
        let address = Address::new("random").with("name", "a");

        let before = engine.get(&address).await.unwrap();
        engine.invalidate(&address);
        let after = engine.get(&address).await.unwrap();

        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn cascades_upstream_not_downstream() {
        let (registry, _) = lower_upper();
        let engine = Engine::new(registry);

        let lower1 = engine.get(&lower("a")).await.unwrap();
        let upper1 = engine.get(&upper("a")).await.unwrap();
        assert_eq!(upper1, json!(lower1.as_str().unwrap().to_uppercase()));

        // Invalidating the consumer leaves its dependency alone
        engine.invalidate(upper("a"));
        assert_eq!(engine.get(&lower("a")).await.unwrap(), lower1);
        assert_eq!(engine.get(&upper("a")).await.unwrap(), upper1);

        // Invalidating the dependency reaches the consumer
        let report = engine.invalidate(lower("a"));
        assert!(report.contains(&upper("a")));
        let upper2 = engine.get(&upper("a")).await.unwrap();
        assert_ne!(upper2, upper1);
    }

    #[tokio::test]
    async fn predicate_invalidation_handles_diamonds() {
        let registry = BuilderRegistry::<Value>::new()
            .with("random", |address: Address, _| async move {
                Ok(json!(address.get_str("name").unwrap_or_default()))
            })
            .with("sum", |_, load: Loader<Value>| async move {
                let a = load.load(&Address::new("random").with("name", "1")).await?;
                let b = load.load(&Address::new("random").with("name", "2")).await?;
                Ok(json!(format!("{}{}", a, b)))
            })
            .with("top", |_, load: Loader<Value>| async move {
                let sum = load.load(&Address::new("sum")).await?;
                let one = load.load(&Address::new("random").with("name", "1")).await?;
                Ok(json!(format!("{}{}", sum, one)))
            })
            .with("other", |_, _| async { Ok(json!("untouched")) });
        let engine = Engine::new(registry);
        let sink = Arc::new(RecordingSink::new());
        engine.set_sink(sink.clone());

        engine.get(&Address::new("top")).await.unwrap();
        engine.get(&Address::new("other")).await.unwrap();
        assert_eq!(engine.len(), 5);

        let report = engine.invalidate_where(|address| address.kind() == "random");

        assert_eq!(report.len(), 4);
        assert_eq!(engine.addresses(), vec![Address::new("other")]);

        let logged = sink.addresses();
        assert_eq!(logged.len(), 4);
        for address in &logged {
            assert_eq!(logged.iter().filter(|a| *a == address).count(), 1);
        }
    }

    #[tokio::test]
    async fn sequence_form_shares_visited_set() {
        let (registry, _) = lower_upper();
        let engine = Engine::new(registry);
        engine.get(&upper("a")).await.unwrap();
        engine.get(&upper("b")).await.unwrap();

        let report = engine.invalidate(vec![lower("a"), upper("a"), lower("zzz"), lower("b")]);

        assert_eq!(report.len(), 4);
        assert!(engine.is_empty());
    }

    #[tokio::test]
    async fn touch_anchors_invalidation() {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&builds);
        let registry =
            BuilderRegistry::<Value>::new().with("config", move |_, load: Loader<Value>| {
                let build = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    load.touch("P").await?;
                    Ok(json!(build))
                }
            });
        let engine = Engine::new(registry);
        let address = Address::new("config");

        let first = engine.get(&address).await.unwrap();
        assert!(engine.contains(&Address::touch("P")));
        assert_eq!(engine.get(&address).await.unwrap(), first);

        let report = engine.invalidate_where(|a| a.get_str("path") == Some("P"));
        assert_eq!(report.len(), 2);

        let second = engine.get(&address).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failures_propagate_to_consumers() {
        let registry = BuilderRegistry::<Value>::new()
            .with("broken", |address: Address, _| async move {
                Err(LoadError::build(&address, "no such file"))
            })
            .with("reader", |_, load: Loader<Value>| async move {
                load.load(&Address::new("broken")).await
            });
        let engine = Engine::new(registry);

        let err = engine.get(&Address::new("reader")).await.unwrap_err();
        assert!(err.to_string().contains("no such file"));

        // The failure is cached and the edge recorded
        assert_eq!(
            engine.consumers_of(&Address::new("broken")),
            Some(vec![Address::new("reader")])
        );
        let report = engine.invalidate(Address::new("broken"));
        assert_eq!(report.len(), 2);
    }
}

mod expiry {
    use super::*;

    fn ttl_registry(ttl: chrono::Duration) -> (BuilderRegistry<Value>, Arc<AtomicUsize>) {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&builds);
        let registry = BuilderRegistry::<Value>::new()
            .with_options(
                "random",
                move |_, _| {
                    let stamp = counter.fetch_add(1, Ordering::SeqCst);
                    async move { Ok(json!(stamp)) }
                },
                BuildOptions::with_ttl(ttl),
            )
            .with("consumer", |_, load: Loader<Value>| async move {
                let value = load.load(&Address::new("random")).await?;
                Ok(json!({"seen": value}))
            });
        (registry, builds)
    }

    #[tokio::test]
    async fn expired_entries_rebuild() {
        let (registry, _) = ttl_registry(chrono::Duration::milliseconds(1));
        let engine = Engine::new(registry);
        let address = Address::new("random");

        let first = engine.get(&address).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = engine.get(&address).await.unwrap();

        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn fresh_entries_are_reused() {
        let (registry, builds) = ttl_registry(chrono::Duration::seconds(60));
        let engine = Engine::new(registry);
        let address = Address::new("random");

        let first = engine.get(&address).await.unwrap();
        let second = engine.get(&address).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(engine.entry_info(&address).unwrap().expires_at.is_some());
    }

    #[tokio::test]
    async fn soft_expiry_keeps_consumers() {
        let (registry, _) = ttl_registry(chrono::Duration::milliseconds(1));
        let engine = Engine::new(registry);

        let consumer = engine.get(&Address::new("consumer")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let refreshed = engine.get(&Address::new("random")).await.unwrap();
        assert_ne!(consumer["seen"], refreshed);

        // Consumer was not cascaded, and the new entry starts with no edges
        assert_eq!(engine.get(&Address::new("consumer")).await.unwrap(), consumer);
        assert_eq!(engine.consumers_of(&Address::new("random")), Some(vec![]));
    }

    #[tokio::test]
    async fn cascade_expiry_rebuilds_consumers() {
        let (registry, _) = ttl_registry(chrono::Duration::milliseconds(1));
        let options = EngineOptions {
            expiry: ExpiryPolicy::Cascade,
            ..Default::default()
        };
        let engine = Engine::with_options(registry, options);
        let sink = Arc::new(RecordingSink::new());
        engine.set_sink(sink.clone());

        let consumer = engine.get(&Address::new("consumer")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        engine.get(&Address::new("random")).await.unwrap();
        assert_eq!(sink.events().len(), 2);
        assert!(!engine.contains(&Address::new("consumer")));
        assert_ne!(engine.get(&Address::new("consumer")).await.unwrap(), consumer);
    }

    #[tokio::test]
    async fn dependency_loads_reuse_expired_entries() {
        let (registry, builds) = ttl_registry(chrono::Duration::milliseconds(1));
        let engine = Engine::new(registry);
        let consumer = Address::new("consumer");

        let first = engine.get(&consumer).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        engine.invalidate(&consumer);
        let second = engine.get(&consumer).await.unwrap();

        assert_eq!(first["seen"], json!(0));
        assert_eq!(second["seen"], json!(0));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(
            engine.consumers_of(&Address::new("random")),
            Some(vec![consumer])
        );
    }

    #[tokio::test]
    async fn cascade_expiry_spares_rebuilding_consumer() {
        let consumer_builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&consumer_builds);
        let (registry, random_builds) = ttl_registry(chrono::Duration::milliseconds(1));
        let registry = registry.with("consumer", move |_, load: Loader<Value>| {
            let build = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                let value = load.load(&Address::new("random")).await?;
                Ok(json!({"seen": value, "build": build}))
            }
        });
        let options = EngineOptions {
            expiry: ExpiryPolicy::Cascade,
            ..Default::default()
        };
        let engine = Engine::with_options(registry, options);
        let sink = Arc::new(RecordingSink::new());
        engine.set_sink(sink.clone());
        let consumer = Address::new("consumer");

        engine.get(&consumer).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        engine.invalidate(&consumer);

        let second = engine.get(&consumer).await.unwrap();
        assert!(engine.contains(&consumer));
        let third = engine.get(&consumer).await.unwrap();

        assert_eq!(second, third);
        assert_eq!(second["build"], json!(1));
        assert_eq!(consumer_builds.load(Ordering::SeqCst), 2);
        assert_eq!(random_builds.load(Ordering::SeqCst), 1);
        assert_eq!(sink.addresses(), vec![consumer]);
    }

    #[tokio::test]
    async fn config_overrides_declared_ttl() {
        let config: depcache::config::Config = toml::from_str(
            r#"
            [ttl]
            random = 60000
            "#,
        )
        .unwrap();
        let (registry, builds) = ttl_registry(chrono::Duration::milliseconds(1));
        let engine = Engine::with_options(registry, config.engine_options());

        engine.get(&Address::new("random")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        engine.get(&Address::new("random")).await.unwrap();

        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }
}

mod lifetime {
    use super::*;
    use tokio::sync::Notify;

    #[tokio::test]
    async fn dropped_engine_fails_pending_dependency_loads() {
        let gate = Arc::new(Notify::new());
        let wait = Arc::clone(&gate);
        let registry = BuilderRegistry::<Value>::new()
            .with("leaf", |_, _| async { Ok(json!("leaf")) })
            .with("root", move |_, load: Loader<Value>| {
                let wait = Arc::clone(&wait);
                async move {
                    wait.notified().await;
                    load.load(&Address::new("leaf")).await
                }
            });
        let engine = Engine::new(registry);

        let pending = engine.load(&Address::new("root")).unwrap();
        drop(engine);
        gate.notify_one();

        assert_eq!(pending.await, Err(LoadError::EngineDropped));
    }
}
