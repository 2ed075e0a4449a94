use ravel::config::{LoadBalanceStrategy, TaskConfig, Upstream};
use ravel::handlers::Handler;
use ravel::match_engine::{MatchCriteria, MatchEngine};
use ravel::stats::Stats;
use ravel::strategies::{thread_per_client, Dispatch};
use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn spawn_thread_per_client(rules: Vec<(MatchCriteria, TaskConfig)>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener); // free the port for create_listen_socket to rebind

    let built: Vec<_> = rules
        .into_iter()
        .map(|(criteria, task)| (criteria, Handler::build(&task).unwrap()))
        .collect();
    let engine = Arc::new(MatchEngine::new(built));
    let dispatch = Arc::new(Dispatch {
        engine,
        stats: Arc::new(Stats::new()),
    });
    let shutdown = Arc::new(AtomicBool::new(false));

    thread::spawn(move || {
        thread_per_client::run("127.0.0.1", port, dispatch, shutdown);
    });
    thread::sleep(Duration::from_millis(100));
    port
}

/// Sends one request over a fresh connection and reads the response. Since
/// the server now keeps a connection open for further requests rather than
/// closing after every one (the per-connection loop runs until the client
/// closes, goes idle, or sends something malformed), the client half-closes
/// its write side right after sending: that EOF is what the server's next
/// read sees, which is what makes it close its side and let
/// `read_to_string` return instead of blocking forever.
fn send(port: u16, request: &str) -> String {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream.write_all(request.as_bytes()).unwrap();
    stream.shutdown(Shutdown::Write).unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    response
}

#[test]
fn health_check_responds_200() {
    let port = spawn_thread_per_client(vec![(MatchCriteria::new(), TaskConfig::HealthCheck)]);
    let response = send(port, "GET /status HTTP/1.1\r\nHost: x:1\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.ends_with("I'm Healthy!"));
}

#[test]
fn no_matching_task_yields_400() {
    let criteria = MatchCriteria::new().with("url", vec!["/only-this/".to_string()]);
    let port = spawn_thread_per_client(vec![(criteria, TaskConfig::HealthCheck)]);
    let response = send(port, "GET /elsewhere HTTP/1.1\r\nHost: x:1\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 400"));
}

#[test]
fn static_asset_hit_and_miss() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"asset body").unwrap();
    let criteria = MatchCriteria::new().with("url", vec!["/static/".to_string()]);
    let port = spawn_thread_per_client(vec![(
        criteria,
        TaskConfig::StaticAsset {
            root: dir.path().to_str().unwrap().to_string(),
            strip_prefix: "/static/".to_string(),
        },
    )]);

    let hit = send(port, "GET /static/a.txt HTTP/1.1\r\nHost: x:1\r\n\r\n");
    assert!(hit.starts_with("HTTP/1.1 200"));
    assert!(hit.ends_with("asset body"));

    let miss = send(port, "GET /static/missing.txt HTTP/1.1\r\nHost: x:1\r\n\r\n");
    assert!(miss.starts_with("HTTP/1.1 404"));
}

#[test]
fn first_matching_rule_wins_over_a_later_catch_all() {
    let specific = MatchCriteria::new().with("url", vec!["/health".to_string()]);
    let dir = tempfile::tempdir().unwrap();
    let catch_all = MatchCriteria::new();
    let port = spawn_thread_per_client(vec![
        (specific, TaskConfig::HealthCheck),
        (
            catch_all,
            TaskConfig::StaticAsset {
                root: dir.path().to_str().unwrap().to_string(),
                strip_prefix: "/".to_string(),
            },
        ),
    ]);

    let response = send(port, "GET /health HTTP/1.1\r\nHost: x:1\r\n\r\n");
    assert!(response.ends_with("I'm Healthy!"));
}

fn spawn_fixed_response_upstream(body: &'static str) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let mut stream = match stream {
                Ok(s) => s,
                Err(_) => continue,
            };
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf);
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{}",
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).ok();
        }
    });
    thread::sleep(Duration::from_millis(50));
    port
}

#[test]
fn round_robin_load_balancer_alternates_upstreams() {
    let port_a = spawn_fixed_response_upstream("A");
    let port_b = spawn_fixed_response_upstream("B");

    let port = spawn_thread_per_client(vec![(
        MatchCriteria::new(),
        TaskConfig::LoadBalancer {
            strategy: LoadBalanceStrategy::RoundRobin,
            upstreams: vec![
                Upstream {
                    host: "127.0.0.1".to_string(),
                    port: port_a,
                    weight: None,
                },
                Upstream {
                    host: "127.0.0.1".to_string(),
                    port: port_b,
                    weight: None,
                },
            ],
        },
    )]);

    let mut seen = Vec::new();
    for _ in 0..4 {
        let response = send(port, "GET / HTTP/1.1\r\nHost: x:1\r\n\r\n");
        seen.push(response.ends_with('A'));
    }
    assert_eq!(seen, vec![true, false, true, false]);
}

#[test]
fn reverse_proxy_relays_upstream_response_verbatim() {
    let upstream_port = spawn_fixed_response_upstream("proxied");
    let port = spawn_thread_per_client(vec![(
        MatchCriteria::new(),
        TaskConfig::ReverseProxy {
            upstream: Upstream {
                host: "127.0.0.1".to_string(),
                port: upstream_port,
                weight: None,
            },
        },
    )]);

    let response = send(port, "GET / HTTP/1.1\r\nHost: x:1\r\n\r\n");
    assert!(response.ends_with("proxied"));
}
