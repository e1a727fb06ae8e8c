use std::sync::Arc;
use std::time::Duration;

use postbox::breaker::BreakerPolicy;
use postbox::error::{ActorError, FutureError};
use postbox::message::Message;
use postbox::mock::MockTransport;
use postbox::process::receive_fn;
use postbox::remote::{LoopbackNetwork, RemoteSettings, TransportError};
use postbox::system::{ActorOptions, ActorSystem, ActorSystemOptions, SystemRegistry};
use postbox::wire::DataType;
use postbox::{Endpoint, FutureHandle, MessageKind};
use serde_json::json;
use tokio::sync::mpsc;

struct Pair {
    _registry: SystemRegistry,
    _network: LoopbackNetwork,
    alpha: Arc<ActorSystem>,
    beta: Arc<ActorSystem>,
    beta_endpoint: Endpoint,
}

/// Two systems on a loopback network that delivers frames in 7-byte chunks.
fn pair() -> Pair {
    postbox::runtime::setup_test_tracing();
    let registry = SystemRegistry::new();
    let network = LoopbackNetwork::with_chunk_size(7);
    let alpha = registry.get_or_add(ActorSystemOptions::new("alpha")).unwrap();
    let beta = registry.get_or_add(ActorSystemOptions::new("beta")).unwrap();
    let beta_endpoint = Endpoint::new("beta.local", 7001).unwrap();
    network.attach(&alpha, Endpoint::new("alpha.local", 7000).unwrap()).unwrap();
    network.attach(&beta, beta_endpoint.clone()).unwrap();
    Pair {
        _registry: registry,
        _network: network,
        alpha,
        beta,
        beta_endpoint,
    }
}

#[tokio::test]
async fn test_remote_request_response() {
    let pair = pair();
    pair.beta
        .from(ActorOptions::new("echo").with_function(receive_fn(|ctx, env| async move {
            let mut reply = env.data().clone();
            reply["seen_by"] = json!(ctx.aid().to_string());
            ctx.respond_to(&env, reply);
            Ok(())
        })))
        .unwrap();
    let proxy = pair
        .alpha
        .from(ActorOptions::new("echo").remote("beta", pair.beta_endpoint.clone()))
        .unwrap();

    let reply = proxy
        .request(Message::new(json!({"n": 7})).with_header("trace", "abc"))
        .unwrap()
        .await
        .unwrap();
    assert_eq!(reply.kind(), MessageKind::FutureResponse);
    assert_eq!(reply.data(), &json!({"n": 7, "seen_by": "beta/echo"}));

    let binding = pair.alpha.remote_binding().unwrap();
    assert_eq!(binding.pending_requests(), 0);
    assert_eq!(pair.beta.remote_binding().unwrap().inflight_requests(), 0);
}

#[tokio::test]
async fn test_remote_fire_and_forget_and_empty_reply() {
    let pair = pair();
    let (tx, mut rx) = mpsc::unbounded_channel();
    pair.beta
        .from(ActorOptions::new("sink").with_function(receive_fn(move |_, env| {
            let tx = tx.clone();
            async move {
                let _ = tx.send((env.kind(), env.data().clone(), env.header_value("k").map(str::to_string)));
                Ok(())
            }
        })))
        .unwrap();
    let proxy = pair
        .alpha
        .from(ActorOptions::new("sink").remote("beta", pair.beta_endpoint.clone()))
        .unwrap();

    proxy.send(Message::new("one").with_header("k", "v")).unwrap();
    let (kind, data, header) = rx.recv().await.unwrap();
    assert_eq!(kind, MessageKind::Default);
    assert_eq!(data, json!("one"));
    assert_eq!(header.as_deref(), Some("v"));

    // The handler never answers, so the requester gets an empty response.
    let reply = proxy.ask("two").await.unwrap();
    assert!(reply.is_empty_response());
    rx.recv().await.unwrap();
}

#[tokio::test]
async fn test_remote_handler_error_comes_back_as_remote_error() {
    let pair = pair();
    pair.beta
        .from(ActorOptions::new("grumpy").with_function(receive_fn(|_, _| async {
            Err(ActorError::handler("no thanks"))
        })))
        .unwrap();
    let proxy = pair
        .alpha
        .from(ActorOptions::new("grumpy").remote("beta", pair.beta_endpoint.clone()))
        .unwrap();

    let err = proxy.request(Message::new(1)).unwrap().await.unwrap_err();
    match err {
        FutureError::Remote(description) => assert!(description.contains("no thanks"), "{description}"),
        other => panic!("expected a remote error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unknown_remote_actor_faults_request() {
    let pair = pair();
    let proxy = pair
        .alpha
        .from(ActorOptions::new("ghost").remote("beta", pair.beta_endpoint.clone()))
        .unwrap();
    let err = proxy.request(Message::new(1)).unwrap().await.unwrap_err();
    assert!(matches!(err, FutureError::Remote(ref d) if d.contains("beta/ghost")), "{err:?}");
}

#[tokio::test]
async fn test_cancel_propagates_to_remote_handler() {
    let pair = pair();
    let (tx, mut rx) = mpsc::unbounded_channel::<FutureHandle>();
    pair.beta
        .from(ActorOptions::new("slow").with_function(receive_fn(move |_, env| {
            let tx = tx.clone();
            async move {
                if let Some(future) = env.future() {
                    let _ = tx.send(future.clone());
                }
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            }
        })))
        .unwrap();
    let proxy = pair
        .alpha
        .from(ActorOptions::new("slow").remote("beta", pair.beta_endpoint.clone()))
        .unwrap();

    let local = proxy.request(Message::new("work")).unwrap();
    let remote = rx.recv().await.unwrap();
    assert!(!remote.is_terminal());

    assert!(local.cancel());
    assert_eq!(local.clone().await.unwrap_err(), FutureError::Canceled);
    let outcome = tokio::time::timeout(Duration::from_secs(5), remote.result())
        .await
        .unwrap();
    assert_eq!(outcome.unwrap_err(), FutureError::Canceled);
    assert_eq!(pair.beta.remote_binding().unwrap().inflight_requests(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_remote_timeout_travels_with_request() {
    let pair = pair();
    let (tx, mut rx) = mpsc::unbounded_channel::<FutureHandle>();
    pair.beta
        .from(ActorOptions::new("slow").with_function(receive_fn(move |_, env| {
            let tx = tx.clone();
            async move {
                if let Some(future) = env.future() {
                    let _ = tx.send(future.clone());
                }
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            }
        })))
        .unwrap();
    let proxy = pair
        .alpha
        .from(ActorOptions::new("slow").remote("beta", pair.beta_endpoint.clone()))
        .unwrap();

    let local = proxy
        .request_with_timeout(Message::new("work"), Duration::from_millis(250))
        .unwrap();
    let remote = rx.recv().await.unwrap();
    assert_eq!(local.await.unwrap_err(), FutureError::TimedOut);
    assert!(remote.result().await.unwrap_err().is_cancellation());
}

#[tokio::test]
async fn test_unbind_cancels_pending_requests() {
    let pair = pair();
    pair.beta
        .from(ActorOptions::new("slow").with_function(receive_fn(|_, _| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        })))
        .unwrap();
    let proxy = pair
        .alpha
        .from(ActorOptions::new("slow").remote("beta", pair.beta_endpoint.clone()))
        .unwrap();
    let future = proxy.request(Message::new("work")).unwrap();
    while pair.alpha.remote_binding().unwrap().pending_requests() == 0 {
        tokio::task::yield_now().await;
    }

    assert!(pair.alpha.unbind_remote());
    assert_eq!(future.await.unwrap_err(), FutureError::Disposed);
    assert!(pair.alpha.remote_endpoint().is_none());
}

#[tokio::test]
async fn test_breaker_guards_proxy_sends() {
    postbox::runtime::setup_test_tracing();
    let registry = SystemRegistry::new();
    let system = registry.get_or_add(ActorSystemOptions::new("guarded")).unwrap();
    let peer = Endpoint::new("10.9.9.9", 9000).unwrap();
    let mock = MockTransport::new();
    mock.expect_send()
        .to(peer.clone())
        .return_err(TransportError::Unreachable("10.9.9.9:9000".into()));
    mock.expect_send()
        .to(peer.clone())
        .return_err(TransportError::ConnectionClosed("reset".into()));
    mock.expect_send()
        .to(peer.clone())
        .return_err(TransportError::Unreachable("10.9.9.9:9000".into()));
    system
        .bind_remote(
            Arc::new(mock.clone()),
            RemoteSettings::new(Endpoint::new("10.0.0.1", 9000).unwrap()),
        )
        .unwrap();

    let policy = BreakerPolicy::default()
        .with_failure_count_to_open(2)
        .with_keep_open_duration(Duration::from_secs(60));
    let proxy = system
        .from(
            ActorOptions::new("ledger")
                .remote("core", peer)
                .with_circuit_breaker(policy),
        )
        .unwrap();

    // Two failures trip the breaker into half-open; the trial call fails and opens it.
    let first = proxy.ask("a").await.unwrap_err();
    assert!(first.to_string().contains("unreachable"), "{first}");
    let second = proxy.ask("b").await.unwrap_err();
    assert!(second.to_string().contains("connection closed"), "{second}");
    let trial = proxy.ask("c").await.unwrap_err();
    assert!(trial.to_string().contains("unreachable"), "{trial}");
    let rejected = proxy.ask("d").await.unwrap_err();
    assert!(rejected.to_string().contains("circuit open"), "{rejected}");

    assert_eq!(mock.sent_frames().len(), 3);
    let sent = mock.sent_messages();
    assert!(sent.iter().all(|(_, m)| m.data_type() == DataType::Envelope));
    assert!(sent.iter().all(|(_, m)| m.kind() == MessageKind::FutureRequest));
    mock.verify();
}

