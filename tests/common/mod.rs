//! Shared utilities for integration testing.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use ring_monitor::alert::{AudioOutput, OutputError, VibrationPattern, Vibrator};

/// Handle to a running mock status endpoint.
#[derive(Clone)]
pub struct MockBackend {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    paths: Arc<Mutex<Vec<String>>>,
}

#[allow(dead_code)]
impl MockBackend {
    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }
}

/// Start a programmable mock backend on an ephemeral port. `f` decides the
/// status code and JSON body of every response.
pub async fn start_programmable_backend<F, Fut>(f: F) -> MockBackend
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend = MockBackend {
        addr: listener.local_addr().unwrap(),
        hits: Arc::new(AtomicUsize::new(0)),
        paths: Arc::new(Mutex::new(Vec::new())),
    };
    let f = Arc::new(f);
    let state = backend.clone();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    let state = state.clone();
                    tokio::spawn(async move {
                        let mut request = Vec::new();
                        let mut buf = [0u8; 1024];
                        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                            match socket.read(&mut buf).await {
                                Ok(0) | Err(_) => return,
                                Ok(n) => request.extend_from_slice(&buf[..n]),
                            }
                        }
                        let head = String::from_utf8_lossy(&request);
                        let path = head.split_whitespace().nth(1).unwrap_or("").to_string();
                        state.paths.lock().unwrap().push(path);
                        state.hits.fetch_add(1, Ordering::SeqCst);

                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    backend
}

/// Mock backend that always answers with the same status and body.
#[allow(dead_code)]
pub async fn start_mock_backend(status: u16, body: &'static str) -> MockBackend {
    start_programmable_backend(move || async move { (status, body.to_string()) }).await
}

/// Poll `condition` until it holds or `timeout` passes.
#[allow(dead_code)]
pub async fn wait_for<F: Fn() -> bool>(condition: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

/// Audio output that only tracks what would be playing.
#[derive(Default)]
#[allow(dead_code)]
pub struct RecordingAudio {
    pub silent: AtomicBool,
    pub alert: AtomicBool,
    pub overlap: AtomicBool,
}

impl AudioOutput for RecordingAudio {
    fn start_silent(&self) -> Result<(), OutputError> {
        if self.alert.load(Ordering::SeqCst) {
            self.overlap.store(true, Ordering::SeqCst);
        }
        self.silent.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_silent_playing(&self) -> bool {
        self.silent.load(Ordering::SeqCst)
    }

    fn stop_silent(&self) {
        self.silent.store(false, Ordering::SeqCst);
    }

    fn play_alert(&self) -> Result<(), OutputError> {
        if self.silent.load(Ordering::SeqCst) {
            self.overlap.store(true, Ordering::SeqCst);
        }
        self.alert.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_alert_playing(&self) -> bool {
        self.alert.load(Ordering::SeqCst)
    }

    fn stop_alert(&self) {
        self.alert.store(false, Ordering::SeqCst);
    }
}

#[derive(Default)]
#[allow(dead_code)]
pub struct RecordingVibrator {
    pub active: AtomicBool,
}

impl Vibrator for RecordingVibrator {
    fn vibrate(&self, _pattern: &VibrationPattern) -> Result<(), OutputError> {
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn cancel(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}
