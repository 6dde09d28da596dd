//! Concurrent senders sharing one connection

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use authlink::config::NetworkConfig;
use authlink::core::frame::Frame;
use authlink::protocol::dispatcher::Dispatcher;
use authlink::protocol::handshake::{Credential, MemoryCredentialStore};
use authlink::service::client::{Client, Inbound};
use authlink::transport::tcp::Server;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_senders_never_interleave_frames() {
    let tasks = 8usize;
    let per_task = 50usize;

    let mut config = NetworkConfig::default_with_overrides(|cfg| {
        cfg.server.address = "127.0.0.1:0".into();
    });
    let store = MemoryCredentialStore::new()
        .with_credential(Credential::from_password("user1", "password").unwrap());

    let received = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&received);
    let dispatcher = Dispatcher::new();
    dispatcher
        .register_all(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

    let server = Server::bind(config.clone(), Arc::new(store))
        .await
        .unwrap()
        .with_dispatcher(dispatcher);
    config.client.address = server.local_addr().unwrap().to_string();
    let metrics = server.metrics();
    let (shutdown, rx) = mpsc::channel(1);
    let handle = tokio::spawn(server.run_with_shutdown(rx));

    let client = Client::connect(&config, "user1", "password").await.unwrap();
    let (sender, mut inbox) = client.into_parts();

    let mut senders = JoinSet::new();
    for task in 0..tasks {
        let sender = sender.clone();
        senders.spawn(async move {
            for i in 0..per_task {
                let payload = format!("task-{task}-message-{i}-").repeat(16);
                match i % 3 {
                    0 => sender.send_text(payload).await.unwrap(),
                    1 => sender.send_command(payload, "param").await.unwrap(),
                    _ => sender
                        .send_data_packet(i as u32, task as f64, payload)
                        .await
                        .unwrap(),
                }
            }
        });
    }
    drop(sender);

    let mut statuses = 0usize;
    while statuses < tasks * per_task {
        match inbox.next().await.expect("connection ended early").unwrap() {
            Inbound::Status(line) => {
                assert!(line.contains("received successfully"), "bad status: {line}");
                statuses += 1;
            }
            other => panic!("unexpected inbound: {other:?}"),
        }
    }

    while let Some(res) = senders.join_next().await {
        res.unwrap();
    }

    assert_eq!(received.load(Ordering::SeqCst), tasks * per_task);
    shutdown.send(()).await.unwrap();
    handle.await.unwrap().unwrap();

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.checksum_failures, 0);
    assert_eq!(snapshot.frames_ok as usize, tasks * per_task);
}

#[tokio::test]
async fn independent_connections_do_not_share_state() {
    let mut config = NetworkConfig::default_with_overrides(|cfg| {
        cfg.server.address = "127.0.0.1:0".into();
    });
    let store = MemoryCredentialStore::new()
        .with_credential(Credential::from_password("user1", "password").unwrap())
        .with_credential(Credential::from_password("user2", "hunter2").unwrap());
    let server = Server::bind(config.clone(), Arc::new(store)).await.unwrap();
    config.client.address = server.local_addr().unwrap().to_string();
    let (shutdown, rx) = mpsc::channel(1);
    let handle = tokio::spawn(server.run_with_shutdown(rx));

    let mut first = Client::connect(&config, "user1", "password").await.unwrap();
    let mut second = Client::connect(&config, "user2", "hunter2").await.unwrap();
    assert!(Client::connect(&config, "user2", "password").await.is_err());

    second.send(Frame::text("from second")).await.unwrap();
    first
        .send(Frame::command("from", "first"))
        .await
        .unwrap();

    assert_eq!(
        first.next_inbound().await.unwrap().unwrap(),
        Inbound::Status("Command message received successfully".into())
    );
    assert_eq!(
        second.next_inbound().await.unwrap().unwrap(),
        Inbound::Status("Text message received successfully".into())
    );

    first.shutdown().await.unwrap();
    second.shutdown().await.unwrap();
    shutdown.send(()).await.unwrap();
    handle.await.unwrap().unwrap();
}
