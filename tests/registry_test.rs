use std::sync::Arc;

use async_trait::async_trait;
use postbox::error::ActorError;
use postbox::message::Envelope;
use postbox::process::{receive_fn, Actor, ActorContext};
use postbox::system::{ActorClient, ActorOptions, ActorSystemOptions, SystemRegistry};
use postbox::{Aid, Endpoint, Pid};
use serde::{Deserialize, Serialize};

#[derive(Default)]
struct Ledger {
    balance: i64,
}

#[derive(Serialize, Deserialize)]
struct Deposit {
    amount: i64,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Balance {
    total: i64,
}

#[async_trait]
impl Actor for Ledger {
    async fn receive(&mut self, ctx: &ActorContext, env: Envelope) -> Result<(), ActorError> {
        let deposit: Deposit = env.data_as()?;
        self.balance += deposit.amount;
        ctx.respond_to_with(&env, &Balance { total: self.balance })?;
        Ok(())
    }
}

#[derive(Default)]
struct Other;

#[async_trait]
impl Actor for Other {
    async fn receive(&mut self, _ctx: &ActorContext, _env: Envelope) -> Result<(), ActorError> {
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_get_or_add_yields_one_system() {
    let registry = SystemRegistry::new();
    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move { registry.get_or_add(ActorSystemOptions::new(" shared ")).unwrap() })
        })
        .collect();
    let mut systems = Vec::new();
    for task in tasks {
        systems.push(task.await.unwrap());
    }
    assert!(systems.iter().all(|s| Arc::ptr_eq(s, &systems[0])));
    assert_eq!(systems[0].name(), "shared");
    assert_eq!(registry.names(), vec!["shared".to_string()]);
}

#[tokio::test]
async fn test_registries_are_independent() {
    let a = SystemRegistry::new();
    let b = SystemRegistry::new();
    let sa = a.get_or_add(ActorSystemOptions::new("app")).unwrap();
    let sb = b.get_or_add(ActorSystemOptions::new("app")).unwrap();
    assert!(!Arc::ptr_eq(&sa, &sb));
    assert!(matches!(
        a.get_or_add(ActorSystemOptions::new("  ")),
        Err(ActorError::EmptyName(_))
    ));
}

#[tokio::test]
async fn test_registration_is_idempotent_per_type() {
    let registry = SystemRegistry::new();
    let system = registry.get_or_add(ActorSystemOptions::new("ledgers")).unwrap();

    let first = system.from(ActorOptions::new("main").with_type::<Ledger>()).unwrap();
    let again = system.from(ActorOptions::new("main").with_type::<Ledger>()).unwrap();
    assert_eq!(first, again);

    let clash = system.from(ActorOptions::new("main").with_type::<Other>());
    assert!(matches!(clash, Err(ActorError::AlreadyExists { ref name, .. }) if name == "main"));

    let f = receive_fn(|_, _| async { Ok(()) });
    system.from(ActorOptions::new("fn").with_function(f.clone())).unwrap();
    system.from(ActorOptions::new("fn").with_function(f)).unwrap();
    let other_fn = receive_fn(|_, _| async { Ok(()) });
    assert!(system.from(ActorOptions::new("fn").with_function(other_fn)).is_err());
    assert!(system.from(ActorOptions::new("fn").with_type::<Ledger>()).is_err());

    assert!(matches!(
        system.from(ActorOptions::new("bare")),
        Err(ActorError::MissingBacking(_))
    ));
    assert!(system.from(ActorOptions::new("")).unwrap_err().is_configuration());

    assert_eq!(system.actor_names(), vec!["fn".to_string(), "main".to_string()]);
    assert!(system.try_get("main").unwrap().is_local());
    assert!(system.try_get("missing").is_none());
}

#[tokio::test]
async fn test_remote_proxy_is_not_local() {
    let registry = SystemRegistry::new();
    let system = registry.get_or_add(ActorSystemOptions::new("edge")).unwrap();
    let endpoint = Endpoint::new("10.1.1.1", 4000).unwrap();
    let proxy = system
        .from(ActorOptions::new("ledger").remote("core", endpoint.clone()))
        .unwrap();
    assert!(!proxy.is_local());
    assert!(!proxy.is_coordinate());
    assert_eq!(proxy.aid(), &Aid::new("core", "ledger"));
    assert_eq!(system.try_get_remote(&Aid::new("core", "ledger")), Some(proxy.clone()));

    let again = system.from(ActorOptions::new("ledger").remote("core", endpoint)).unwrap();
    assert_eq!(again, proxy);
    let moved = system.from(ActorOptions::new("ledger").remote("core", Endpoint::new("10.1.1.2", 4000).unwrap()));
    assert!(matches!(moved, Err(ActorError::AlreadyExists { .. })));

    // Without a binding the send is accepted, then fails in the drain.
    let err = proxy.ask("hello").await.unwrap_err();
    assert!(err.to_string().contains("No remote transport"), "{err}");
}

struct LedgerClient {
    pid: Pid,
}

#[derive(Debug)]
enum LedgerError {
    Runtime(String),
}

#[async_trait]
impl ActorClient for LedgerClient {
    type Error = LedgerError;

    fn pid(&self) -> &Pid {
        &self.pid
    }

    fn map_error(e: ActorError) -> LedgerError {
        LedgerError::Runtime(e.to_string())
    }
}

#[tokio::test]
async fn test_typed_client_round_trip() {
    let registry = SystemRegistry::new();
    let system = registry.get_or_add(ActorSystemOptions::new("typed")).unwrap();
    let client = LedgerClient {
        pid: system.from(ActorOptions::new("ledger").with_type::<Ledger>()).unwrap(),
    };

    let balance: Balance = client.ask(&Deposit { amount: 10 }).await.unwrap();
    assert_eq!(balance, Balance { total: 10 });
    client.tell(&Deposit { amount: 5 }).unwrap();
    let balance: Balance = client.ask(&Deposit { amount: 1 }).await.unwrap();
    assert_eq!(balance.total, 16);

    // A payload the actor cannot decode surfaces as the client's own error type.
    let result: Result<Balance, LedgerError> = client.ask(&"not a deposit").await;
    let LedgerError::Runtime(message) = result.unwrap_err();
    assert!(message.contains("Handler failed"), "{message}");
}

#[tokio::test]
async fn test_dispose_all_empties_registry() {
    let registry = SystemRegistry::new();
    let a = registry.get_or_add(ActorSystemOptions::new("a")).unwrap();
    registry.get_or_add(ActorSystemOptions::new("b")).unwrap();
    let pid = a.from(ActorOptions::new("ledger").with_type::<Ledger>()).unwrap();

    registry.dispose_all().await;
    assert!(registry.names().is_empty());
    assert!(pid.is_coordinate());
    assert!(matches!(pid.tell(1), Err(ActorError::ProcessUnavailable(_))));

    // The name is free again.
    let fresh = registry.get_or_add(ActorSystemOptions::new("a")).unwrap();
    assert!(!Arc::ptr_eq(&fresh, &a));
}
