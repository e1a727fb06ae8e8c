use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use postbox::error::{ActorError, FutureError};
use postbox::message::{Envelope, Message};
use postbox::process::{receive_fn, Actor, ActorContext};
use postbox::system::{ActorOptions, ActorSystem, ActorSystemOptions, SystemRegistry};
use serde_json::{json, Value};

fn system(name: &str) -> (SystemRegistry, Arc<ActorSystem>) {
    postbox::runtime::setup_test_tracing();
    let registry = SystemRegistry::new();
    let system = registry.get_or_add(ActorSystemOptions::new(name)).unwrap();
    (registry, system)
}

/// Records every payload it sees; answers `"dump"` with the full log.
#[derive(Default)]
struct Recorder {
    seen: Vec<Value>,
}

#[async_trait]
impl Actor for Recorder {
    async fn receive(&mut self, ctx: &ActorContext, env: Envelope) -> Result<(), ActorError> {
        if env.data() == "dump" {
            ctx.respond_to(&env, Value::Array(self.seen.clone()));
            return Ok(());
        }
        if env.data() == "slow" {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        self.seen.push(env.data().clone());
        Ok(())
    }
}

async fn dump(pid: &postbox::Pid) -> Vec<Value> {
    let reply = pid.ask("dump").await.unwrap();
    reply.data_as().unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fifo_per_producer_under_concurrency() {
    let (_registry, system) = system("fifo");
    let pid = system.from(ActorOptions::new("recorder").with_type::<Recorder>()).unwrap();

    let producers: Vec<_> = (0..8)
        .map(|producer| {
            let pid = pid.clone();
            tokio::spawn(async move {
                for seq in 0..200 {
                    pid.tell(json!({"p": producer, "s": seq})).unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.await.unwrap();
    }

    let seen = dump(&pid).await;
    assert_eq!(seen.len(), 8 * 200);
    let mut last: HashMap<u64, i64> = HashMap::new();
    for item in seen {
        let p = item["p"].as_u64().unwrap();
        let s = item["s"].as_i64().unwrap();
        let previous = last.insert(p, s).unwrap_or(-1);
        assert_eq!(s, previous + 1, "producer {p} out of order");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_handler_never_runs_concurrently() {
    let (_registry, system) = system("single-drainer");
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let handled = Arc::new(AtomicUsize::new(0));

    let receive = {
        let (active, peak, handled) = (active.clone(), peak.clone(), handled.clone());
        receive_fn(move |_, _| {
            let (active, peak, handled) = (active.clone(), peak.clone(), handled.clone());
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                active.fetch_sub(1, Ordering::SeqCst);
                handled.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    };
    let pid = system
        .from(ActorOptions::new("guarded").with_function(receive).with_sequential_invoke_limit(3))
        .unwrap();

    let producers: Vec<_> = (0..4)
        .map(|_| {
            let pid = pid.clone();
            tokio::spawn(async move {
                for i in 0..100 {
                    pid.tell(i).unwrap();
                    if i % 10 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            })
        })
        .collect();
    for producer in producers {
        producer.await.unwrap();
    }
    // FIFO: by the time this answers, everything before it ran.
    pid.ask("last").await.unwrap();

    assert_eq!(handled.load(Ordering::SeqCst), 401);
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_small_invoke_limit_still_drains_everything() {
    postbox::runtime::setup_test_tracing();
    let registry = SystemRegistry::new();
    let system = registry
        .get_or_add(ActorSystemOptions::new("batches").with_sequential_invoke_limit(2))
        .unwrap();
    let pid = system.from(ActorOptions::new("recorder").with_type::<Recorder>()).unwrap();
    for i in 0..25 {
        pid.tell(i).unwrap();
    }
    let seen = dump(&pid).await;
    assert_eq!(seen, (0..25).map(Value::from).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_handler_error_faults_request_and_reaches_error_handlers() {
    postbox::runtime::setup_test_tracing();
    let reports = Arc::new(Mutex::new(Vec::<String>::new()));
    let registry = SystemRegistry::new();
    let system = {
        let reports = reports.clone();
        registry
            .get_or_add(ActorSystemOptions::new("faults").with_error_handler(move |e, env| {
                let id = env.map(|env| env.data().to_string()).unwrap_or_default();
                reports.lock().push(format!("system {e} {id}"));
            }))
            .unwrap()
    };
    let actor_reports = reports.clone();
    let pid = system
        .from(
            ActorOptions::new("fragile")
                .with_function(receive_fn(|ctx, env| async move {
                    match env.data().as_str() {
                        Some("fail") => Err(ActorError::handler("refused")),
                        Some("panic") => panic!("boom"),
                        _ => {
                            ctx.respond_to(&env, "fine");
                            Ok(())
                        }
                    }
                }))
                .with_error_handler(move |e, _| actor_reports.lock().push(format!("actor {e}"))),
        )
        .unwrap();

    let failed = pid.request(Message::new("fail")).unwrap();
    let panicked = pid.request(Message::new("panic")).unwrap();
    let after = pid.request(Message::new("ok")).unwrap();

    let failed = failed.await.unwrap_err();
    assert_eq!(failed, FutureError::Failed("refused".into()));
    assert_eq!(failed.to_string(), "Handler failed: refused");
    assert!(matches!(panicked.await, Err(FutureError::Failed(msg)) if msg.contains("boom")));
    assert_eq!(after.await.unwrap().data(), "fine");

    let reports = reports.lock().clone();
    assert_eq!(reports.len(), 4, "{reports:?}");
    assert!(reports[0].starts_with("actor ") && reports[0].contains("refused"));
    assert!(reports[1].starts_with("system ") && reports[1].contains("\"fail\""));
    assert!(reports[2].starts_with("actor ") && reports[2].contains("boom"));
    assert!(reports[3].starts_with("system ") && reports[3].contains("\"panic\""));
}

#[tokio::test]
async fn test_plain_return_answers_with_empty_response() {
    let (_registry, system) = system("empty");
    let pid = system
        .from(ActorOptions::new("quiet").with_function(receive_fn(|_, _| async { Ok(()) })))
        .unwrap();
    let reply = pid.ask("anything").await.unwrap();
    assert!(reply.is_empty_response());
    assert_eq!(reply.from(), pid.aid());
}

#[tokio::test(start_paused = true)]
async fn test_request_times_out() {
    let (_registry, system) = system("timeouts");
    let pid = system
        .from(ActorOptions::new("sleepy").with_function(receive_fn(|_, _| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })))
        .unwrap();

    let future = pid
        .request_with_timeout(Message::new("x"), Duration::from_millis(50))
        .unwrap();
    assert_eq!(future.clone().await.unwrap_err(), FutureError::TimedOut);
    assert!(future.timed_out());
    assert!(future.status().is_terminal());
}

#[tokio::test(start_paused = true)]
async fn test_system_default_timeout_applies() {
    postbox::runtime::setup_test_tracing();
    let registry = SystemRegistry::new();
    let system = registry
        .get_or_add(
            ActorSystemOptions::new("default-timeout").with_default_request_timeout(Duration::from_millis(20)),
        )
        .unwrap();
    let pid = system
        .from(ActorOptions::new("sleepy").with_function(receive_fn(|_, _| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })))
        .unwrap();
    let started = tokio::time::Instant::now();
    assert!(matches!(
        pid.ask("x").await,
        Err(ActorError::Future(FutureError::TimedOut))
    ));
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(20) && elapsed < Duration::from_secs(1));
}

#[tokio::test]
async fn test_handler_error_ends_the_batch() {
    let (_registry, system) = system("batch-halt");
    let turns = Arc::new(Mutex::new(Vec::<(String, Option<tokio::task::Id>)>::new()));
    let receive = {
        let turns = turns.clone();
        receive_fn(move |_, env| {
            let turns = turns.clone();
            async move {
                let label = env.data().as_str().unwrap_or_default().to_string();
                turns.lock().push((label.clone(), tokio::task::try_id()));
                if label == "fail" {
                    return Err(ActorError::handler("refused"));
                }
                Ok(())
            }
        })
    };
    let pid = system
        .from(ActorOptions::new("batched").with_function(receive).with_sequential_invoke_limit(10))
        .unwrap();

    // All four are queued before the first drain runs, so one turn could take them all.
    pid.tell("a").unwrap();
    let failed = pid.request(Message::new("fail")).unwrap();
    pid.tell("b").unwrap();
    pid.ask("c").await.unwrap();
    assert!(failed.await.is_err());

    let turns = turns.lock().clone();
    let labels: Vec<&str> = turns.iter().map(|(label, _)| label.as_str()).collect();
    assert_eq!(labels, vec!["a", "fail", "b", "c"]);
    let task = |i: usize| turns[i].1.unwrap();
    assert_eq!(task(0), task(1));
    assert_ne!(task(1), task(2), "the message after a failure must wait for the next turn");
    assert_eq!(task(2), task(3));
}

#[tokio::test(start_paused = true)]
async fn test_expired_message_is_dropped_silently() {
    let reports = Arc::new(AtomicUsize::new(0));
    let (_registry, system) = system("stale-tell");
    let counter = reports.clone();
    let pid = system
        .from(
            ActorOptions::new("recorder")
                .with_type::<Recorder>()
                .with_error_handler(move |_, _| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
        )
        .unwrap();

    pid.tell("slow").unwrap();
    pid.send(Message::new("stale").with_timeout(Duration::from_millis(10)))
        .unwrap();
    pid.tell("fresh").unwrap();

    assert_eq!(dump(&pid).await, vec![json!("slow"), json!("fresh")]);
    assert_eq!(reports.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stale_request_is_never_delivered() {
    let (_registry, system) = system("stale");
    let pid = system.from(ActorOptions::new("recorder").with_type::<Recorder>()).unwrap();

    pid.tell("slow").unwrap();
    let stale = pid
        .request_with_timeout(Message::new("stale"), Duration::from_millis(10))
        .unwrap();
    pid.tell("fresh").unwrap();

    assert!(stale.await.unwrap_err().is_cancellation());
    assert_eq!(dump(&pid).await, vec![json!("slow"), json!("fresh")]);
}

#[derive(Default)]
struct Disposable {
    disposed: Arc<AtomicUsize>,
}

#[async_trait]
impl Actor for Disposable {
    async fn receive(&mut self, _ctx: &ActorContext, _env: Envelope) -> Result<(), ActorError> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(())
    }

    async fn on_dispose(&mut self, _ctx: &ActorContext) -> Result<(), ActorError> {
        self.disposed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_dispose_cancels_queued_requests() {
    let (registry, system) = system("disposal");
    let disposed = Arc::new(AtomicUsize::new(0));
    let pid = system
        .from(ActorOptions::new("busy").with_actor(Disposable {
            disposed: disposed.clone(),
        }))
        .unwrap();

    let first = pid.request(Message::new(1)).unwrap();
    // Let the drain pick up the first request and park in the handler.
    tokio::time::sleep(Duration::from_millis(10)).await;
    let queued = pid.request(Message::new(2)).unwrap();

    system.dispose().await;

    assert_eq!(queued.await.unwrap_err(), FutureError::Disposed);
    assert!(first.await.is_ok());
    assert_eq!(disposed.load(Ordering::SeqCst), 1);
    assert!(system.is_disposed());
    assert!(registry.try_get("disposal").is_none());
    assert!(matches!(pid.tell(3), Err(ActorError::ProcessUnavailable(_))));
    assert!(matches!(
        system.from(ActorOptions::new("late").with_type::<Recorder>()),
        Err(ActorError::SystemDisposed(_))
    ));
}

struct Stuck;

#[async_trait]
impl Actor for Stuck {
    async fn receive(&mut self, _ctx: &ActorContext, _env: Envelope) -> Result<(), ActorError> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_stuck_handler_does_not_block_dispose() {
    postbox::runtime::setup_test_tracing();
    let registry = SystemRegistry::new();
    let system = registry
        .get_or_add(ActorSystemOptions::new("stuck").with_dispose_timeout(Duration::from_millis(100)))
        .unwrap();
    let stuck = system.from(ActorOptions::new("stuck").with_actor(Stuck)).unwrap();
    let disposed = Arc::new(AtomicUsize::new(0));
    for i in 0..10 {
        system
            .from(ActorOptions::new(format!("worker-{i}")).with_actor(Disposable {
                disposed: disposed.clone(),
            }))
            .unwrap();
    }

    stuck.tell(1).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    let queued = stuck.request(Message::new(2)).unwrap();

    let finished = tokio::time::timeout(Duration::from_secs(1), system.dispose()).await;
    assert!(finished.is_ok(), "dispose waited on the stuck handler");
    assert_eq!(disposed.load(Ordering::SeqCst), 10);
    assert_eq!(queued.await.unwrap_err(), FutureError::Disposed);
    assert!(matches!(stuck.tell(3), Err(ActorError::ProcessUnavailable(_))));
}
