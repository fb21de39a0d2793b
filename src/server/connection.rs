// Connection handling module
// Serves a single accepted TCP connection with hyper

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::config;
use crate::handler;
use crate::logger;

/// Serve a connection in its own task.
///
/// Only the wait for a request head is timed (`performance.read_timeout`,
/// which also bounds idle keep-alive gaps). A response that is being sent
/// is never cut short, and a client that disconnects mid-response only
/// ends its own task.
pub fn accept_connection(
    stream: tokio::net::TcpStream,
    peer_addr: SocketAddr,
    state: &Arc<config::AppState>,
) {
    logger::log_connection_accepted(&peer_addr);

    let state = Arc::clone(state);
    tokio::spawn(async move {
        let io = TokioIo::new(stream);
        let perf = &state.config.performance;

        let mut builder = http1::Builder::new();
        builder
            .timer(TokioTimer::new())
            .header_read_timeout(Duration::from_secs(perf.read_timeout))
            .keep_alive(perf.keep_alive);

        let service_state = Arc::clone(&state);
        let service = service_fn(move |req| {
            handler::handle_request(req, Arc::clone(&service_state), peer_addr)
        });

        match builder.serve_connection(io, service).await {
            Ok(()) => {}
            Err(err) if err.is_incomplete_message() || err.is_canceled() => {
                logger::log_debug(&format!("Client {peer_addr} went away: {err}"));
            }
            Err(err) if err.is_timeout() => {
                logger::log_debug(&format!("Client {peer_addr} idle, closing: {err}"));
            }
            Err(err) => logger::log_connection_error(&err),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{create_listener, start_server_loop};
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;

    const BIG_FILE_LEN: usize = 16 * 1024 * 1024;

    struct TestServer {
        addr: SocketAddr,
        root: std::path::PathBuf,
        stop: oneshot::Sender<()>,
        handle: JoinHandle<&'static str>,
    }

    impl TestServer {
        async fn stop(self) -> &'static str {
            self.stop.send(()).unwrap();
            let reason = self.handle.await.unwrap();
            let _ = std::fs::remove_dir_all(&self.root);
            reason
        }
    }

    fn start(name: &str, read_timeout: u64) -> TestServer {
        let root = std::env::temp_dir()
            .join(format!("nocache-conn-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&root);
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("index.html"), "<html>A</html>").unwrap();

        let mut cfg = config::Config::load_from("does-not-exist/nocache-test-config").unwrap();
        cfg.logging.access_log = false;
        cfg.performance.read_timeout = read_timeout;
        let state = Arc::new(config::AppState::new(&cfg, root.clone()));

        let listener = create_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stop_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(start_server_loop(listener, state, async move {
            let _ = stop_rx.await;
            "test"
        }));

        TestServer { addr, root, stop, handle }
    }

    fn write_big_file(server: &TestServer) {
        std::fs::write(server.root.join("big.bin"), vec![b'x'; BIG_FILE_LEN]).unwrap();
    }

    async fn roundtrip(addr: SocketAddr, raw_request: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw_request.as_bytes()).await.unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn get(path: &str) -> String {
        format!("GET {path} HTTP/1.1\r\nHost: t\r\nConnection: close\r\n\r\n")
    }

    /// Read one response off a kept-alive connection: status line and body
    async fn read_response(reader: &mut BufReader<TcpStream>) -> (String, Vec<u8>) {
        let mut status = String::new();
        reader.read_line(&mut status).await.unwrap();

        let mut content_length = 0;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            if line == "\r\n" || line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().unwrap();
                }
            }
        }

        let mut body = vec![0; content_length];
        reader.read_exact(&mut body).await.unwrap();
        (status.trim_end().to_string(), body)
    }

    #[tokio::test]
    async fn test_end_to_end_over_tcp() {
        let server = start("e2e", 30);
        let addr = server.addr;

        let redirect = roundtrip(addr, &get("/")).await;
        assert!(redirect.starts_with("HTTP/1.1 302 Found\r\n"), "got: {redirect}");
        let lower = redirect.to_ascii_lowercase();
        assert!(lower.contains("\r\nlocation: /new\r\n"));
        assert!(lower.contains("\r\ncache-control: no-cache, no-store, must-revalidate\r\n"));
        assert!(lower.contains("\r\npragma: no-cache\r\n"));
        assert!(lower.contains("\r\nexpires: 0\r\n"));

        let page = roundtrip(addr, &get("/new")).await;
        assert!(page.starts_with("HTTP/1.1 200 OK\r\n"), "got: {page}");
        assert!(page.ends_with("\r\n\r\n<html>A</html>"));

        let missing = roundtrip(addr, &get("/missing.txt")).await;
        assert!(missing.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(missing
            .to_ascii_lowercase()
            .contains("\r\ncache-control: no-cache, no-store, must-revalidate\r\n"));

        assert_eq!(server.stop().await, "test");
        // Listener is closed once the loop returns
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_slow_reader_gets_whole_body() {
        let server = start("slow", 1);
        write_big_file(&server);

        let stream = TcpStream::connect(server.addr).await.unwrap();
        let mut reader = BufReader::new(stream);
        reader
            .get_mut()
            .write_all(get("/big.bin").as_bytes())
            .await
            .unwrap();

        // Stall well past the read timeout while the server is mid-write
        let mut status = String::new();
        reader.read_line(&mut status).await.unwrap();
        assert_eq!(status, "HTTP/1.1 200 OK\r\n");
        tokio::time::sleep(Duration::from_millis(2500)).await;

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).await.unwrap();
        let header_end = rest.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
        assert_eq!(rest.len() - header_end, BIG_FILE_LEN);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_busy_keep_alive_connection_stays_open() {
        let server = start("keepalive", 1);

        let stream = TcpStream::connect(server.addr).await.unwrap();
        let mut reader = BufReader::new(stream);
        // Six requests 400ms apart: longer than the read timeout overall,
        // but never idle that long
        for _ in 0..6 {
            reader
                .get_mut()
                .write_all(b"GET /new HTTP/1.1\r\nHost: t\r\n\r\n")
                .await
                .unwrap();
            let (status, body) = read_response(&mut reader).await;
            assert_eq!(status, "HTTP/1.1 200 OK");
            assert_eq!(body, b"<html>A</html>");
            tokio::time::sleep(Duration::from_millis(400)).await;
        }

        server.stop().await;
    }

    #[tokio::test]
    async fn test_client_disconnect_mid_download() {
        let server = start("disconnect", 30);
        write_big_file(&server);

        for _ in 0..3 {
            let mut stream = TcpStream::connect(server.addr).await.unwrap();
            stream
                .write_all(b"GET /big.bin HTTP/1.1\r\nHost: t\r\n\r\n")
                .await
                .unwrap();
            let mut chunk = [0u8; 4096];
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0);
            drop(stream);
        }

        let page = roundtrip(server.addr, &get("/new")).await;
        assert!(page.starts_with("HTTP/1.1 200 OK\r\n"), "got: {page}");
        assert!(page.ends_with("<html>A</html>"));

        assert_eq!(server.stop().await, "test");
    }
}
