//! End-to-end scenarios driving `connection::run` over an in-memory duplex
//! transport, matching `spec.md` §8 E1-E8.

use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use originhttp::config::Config;
use originhttp::connection::{self, ConnectionOutcome};
use originhttp::request::Request;
use originhttp::response::body::ResponseBody;
use originhttp::response::Response;
use originhttp::router::{BoxFuture, Handler, HandlerResult, Router};
use originhttp::strategy::Strategy;

fn ok_body(body: &'static [u8]) -> impl Handler {
    originhttp::router::handler_fn(move |_req: &mut Request| -> BoxFuture<'_, HandlerResult> {
        Box::pin(async move { Ok(Response::ok(ResponseBody::Static(body.to_vec()))) })
    })
}

fn read_body_handler() -> impl Handler {
    originhttp::router::handler_fn(move |req: &mut Request| -> BoxFuture<'_, HandlerResult> {
        Box::pin(async move {
            req.body.wait().await;
            let data = req.body.read().unwrap();
            Ok(Response::ok(ResponseBody::Static(data)))
        })
    })
}

async fn run_local<F, T>(fut: F) -> T
where
    F: Future<Output = T> + 'static,
    T: 'static,
{
    let local = tokio::task::LocalSet::new();
    local.run_until(fut).await
}

async fn drive(router: Router, input: &[u8]) -> (Vec<u8>, ConnectionOutcome<tokio::io::DuplexStream>) {
    let strategy = Rc::new(Strategy::new(router, Arc::new(Config::new())));
    let (mut client, server) = tokio::io::duplex(4096);
    use tokio::io::AsyncWriteExt;
    client.write_all(input).await.unwrap();
    client.shutdown().await.ok();

    let peer = "127.0.0.1:1".parse().unwrap();
    let local = "127.0.0.1:2".parse().unwrap();
    let outcome = connection::run(server, strategy, peer, local).await;

    // Drain whatever the driver wrote back so far.
    use tokio::io::AsyncReadExt;
    let mut out = Vec::new();
    let _ = client.read_to_end(&mut out).await;
    (out, outcome)
}

#[tokio::test]
async fn e1_basic_get() {
    let mut router = Router::new();
    router.route("/hello", "GET", ok_body(b"ok"));
    let (out, _) = run_local(async move {
        drive(router, b"GET /hello HTTP/1.1\r\nHost: x\r\n\r\n").await
    })
    .await;
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(text.contains("content-length: 2\r\n"));
    assert!(text.ends_with("ok"));
}

#[tokio::test]
async fn e2_chunked_upload() {
    let mut router = Router::new();
    router.route("/up", "POST", read_body_handler());
    let input =
        b"POST /up HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";
    let (out, _) = run_local(async move { drive(router, input).await }).await;
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(text.ends_with("hello world"));
}

#[tokio::test]
async fn e3_start_line_too_long_yields_414() {
    let router = Router::new();
    let mut config = Config::new();
    config.max_line_length(16);
    let strategy = Rc::new(Strategy::new(router, config.done()));
    let input = b"GET /a-path-much-longer-than-sixteen-bytes HTTP/1.1\r\nHost: x\r\n\r\n";

    let out = run_local(async move {
        let (mut client, server) = tokio::io::duplex(4096);
        use tokio::io::AsyncWriteExt;
        client.write_all(input).await.unwrap();
        let peer = "127.0.0.1:1".parse().unwrap();
        let local = "127.0.0.1:2".parse().unwrap();
        let outcome = connection::run(server, strategy, peer, local).await;
        assert!(matches!(outcome, ConnectionOutcome::Closed));
        client.shutdown().await.ok();
        use tokio::io::AsyncReadExt;
        let mut out = Vec::new();
        let _ = client.read_to_end(&mut out).await;
        out
    })
    .await;

    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("HTTP/1.1 414"));
}

#[tokio::test]
async fn e4_expect_continue_then_handler_runs() {
    let mut router = Router::new();
    router.route("/c", "POST", read_body_handler());
    let input = b"POST /c HTTP/1.1\r\nHost: x\r\nContent-Length: 3\r\nExpect: 100-continue\r\n\r\nok!";
    let (out, _) = run_local(async move { drive(router, input).await }).await;
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("HTTP/1.1 100 Continue\r\n\r\n"));
    assert!(text.contains("HTTP/1.1 200 OK\r\n"));
    assert!(text.ends_with("ok!"));
}

#[tokio::test]
async fn e5_head_falls_back_to_get_with_empty_body() {
    let mut router = Router::new();
    router.route("/x", "GET", ok_body(b"hello"));
    let (out, _) = run_local(async move {
        drive(router, b"HEAD /x HTTP/1.1\r\nHost: y\r\n\r\n").await
    })
    .await;
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(text.contains("content-length: 5\r\n"));
    assert!(text.ends_with("\r\n\r\n"));
}

fn e6_router() -> Router {
    let mut r = Router::new();
    r.route("/a/b", "GET", ok_body(b"static"));
    r.route("/a/.../", "GET", ok_body(b"fallback"));
    r
}

#[tokio::test]
async fn e6_router_priority_and_fallback() {
    let router_static = e6_router();
    let (out, _) = run_local(async move {
        drive(router_static, b"GET /a/b HTTP/1.1\r\nHost: x\r\n\r\n").await
    })
    .await;
    assert!(String::from_utf8(out).unwrap().ends_with("static"));

    let router_fallback = e6_router();
    let (out, _) = run_local(async move {
        drive(router_fallback, b"GET /a/c/d HTTP/1.1\r\nHost: x\r\n\r\n").await
    })
    .await;
    assert!(String::from_utf8(out).unwrap().ends_with("fallback"));

    let router_traversal = e6_router();
    let (out, _) = run_local(async move {
        drive(router_traversal, b"GET /a/.. HTTP/1.1\r\nHost: x\r\n\r\n").await
    })
    .await;
    assert!(String::from_utf8(out).unwrap().starts_with("HTTP/1.1 404"));
}

#[tokio::test]
async fn e7_pipelining_preserves_order() {
    let mut router = Router::new();
    router.route("/first", "GET", ok_body(b"one"));
    router.route("/second", "GET", ok_body(b"two"));
    let input = b"GET /first HTTP/1.1\r\nHost: x\r\n\r\nGET /second HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n";
    let (out, outcome) = run_local(async move { drive(router, input).await }).await;
    assert!(matches!(outcome, ConnectionOutcome::Closed));
    let text = String::from_utf8(out).unwrap();
    let first_pos = text.find("one").unwrap();
    let second_pos = text.find("two").unwrap();
    assert!(first_pos < second_pos);
    assert_eq!(text.matches("HTTP/1.1 200 OK").count(), 2);
}

#[tokio::test]
async fn e8_upgrade_hands_off_socket_and_leftover_bytes() {
    fn upgrade_handler() -> impl Handler {
        originhttp::router::handler_fn(move |req: &mut Request| -> BoxFuture<'_, HandlerResult> {
            Box::pin(async move {
                let handshake = originhttp::websocket::get_handshake(req).ok().flatten();
                let accept = handshake.map(|h| h.accept);
                Ok(Response::upgrade("websocket", accept.map(|a| ("sec-websocket-accept", a))))
            })
        })
    }

    let mut router = Router::new();
    router.route("/ws", "GET", upgrade_handler());
    let input = b"GET /ws HTTP/1.1\r\nHost: x\r\nConnection: upgrade\r\nUpgrade: websocket\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\nEXTRA";

    let strategy = Rc::new(Strategy::new(router, Arc::new(Config::new())));
    let (out, leftover) = run_local(async move {
        let (mut client, server) = tokio::io::duplex(4096);
        use tokio::io::AsyncWriteExt;
        client.write_all(input).await.unwrap();
        client.shutdown().await.ok();
        let peer = "127.0.0.1:1".parse().unwrap();
        let local = "127.0.0.1:2".parse().unwrap();
        let outcome = connection::run(server, strategy, peer, local).await;
        let leftover = match outcome {
            ConnectionOutcome::Upgraded { leftover, .. } => leftover,
            ConnectionOutcome::Closed => panic!("expected an upgrade handoff"),
        };
        use tokio::io::AsyncReadExt;
        let mut out = Vec::new();
        let _ = client.read_to_end(&mut out).await;
        (out, leftover)
    })
    .await;

    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
    assert!(text.contains("sec-websocket-accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
    assert_eq!(leftover, b"EXTRA");
}

#[tokio::test]
async fn keep_alive_allows_two_requests_http11_and_closes_http10() {
    let mut router = Router::new();
    router.route("/p", "GET", ok_body(b"p"));
    let input = b"GET /p HTTP/1.1\r\nHost: x\r\n\r\nGET /p HTTP/1.1\r\nHost: x\r\n\r\n";
    run_local(async move {
        let strategy = Rc::new(Strategy::new(router, Arc::new(Config::new())));
        let (mut client, server) = tokio::io::duplex(4096);
        use tokio::io::AsyncWriteExt;
        client.write_all(input).await.unwrap();
        let peer = "127.0.0.1:1".parse().unwrap();
        let local = "127.0.0.1:2".parse().unwrap();

        let timed = tokio::time::timeout(Duration::from_millis(500), connection::run(server, strategy, peer, local)).await;
        assert!(timed.is_err(), "HTTP/1.1 keep-alive connection should stay open awaiting a third request");
    })
    .await;
}
