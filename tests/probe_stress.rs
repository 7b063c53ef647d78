use std::collections::BTreeSet;
use std::time::Duration;
use tokio::net::TcpListener;
use vanguard_recon::core::probe::{grab_banners, scan_ports, PortState};

async fn listeners(count: usize) -> (Vec<TcpListener>, BTreeSet<u16>) {
    let mut held = Vec::with_capacity(count);
    let mut ports = BTreeSet::new();
    for _ in 0..count {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        ports.insert(listener.local_addr().unwrap().port());
        held.push(listener);
    }
    (held, ports)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_port_gets_exactly_one_entry_at_any_concurrency() {
    let (_held, open) = listeners(40).await;
    let mut ports = open.clone();
    // Ports nobody listens on; they may be closed or filtered but must be present.
    ports.extend((1..=200u16).map(|p| p + 40_000).filter(|p| !open.contains(p)));

    for concurrency in [1, 4, 64, 128] {
        let results = scan_ports("127.0.0.1", &ports, Duration::from_millis(500), concurrency).await;
        assert_eq!(results.len(), ports.len(), "concurrency {}", concurrency);
        assert!(results.iter().all(|(port, r)| *port == r.port));
        for port in &open {
            assert_eq!(results[port].state, PortState::Open, "port {} at concurrency {}", port, concurrency);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn banner_batch_covers_every_requested_port() {
    let (held, ports) = listeners(30).await;
    // Accept and immediately close: each grab ends in "no banner".
    for listener in held {
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                drop(socket);
            }
        });
    }

    let banners = grab_banners(
        "127.0.0.1",
        &ports,
        Duration::from_millis(500),
        Duration::from_millis(200),
        3,
    )
    .await;
    assert_eq!(banners.len(), ports.len());
    assert!(banners.values().all(|b| matches!(b, Ok(None))), "{:?}", banners);
}
