//! Shared utilities for lifecycle integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::routing::get;
use axum::Router;
use service_lifecycle::config::AppConfig;
use service_lifecycle::dependency::{Dependency, Handle, HandleError, Handles, OpenError};
use service_lifecycle::lifecycle::LifecyclePhase;
use tokio::sync::watch;

/// Ordered record of every open/close call across all mock dependencies.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    fn push(&self, event: String) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

/// A dependency whose open/close behavior is scripted by the test.
pub struct MockDependency {
    name: &'static str,
    log: EventLog,
    fail_open: bool,
    fail_close: bool,
}

impl MockDependency {
    pub fn new(name: &'static str, log: &EventLog) -> Self {
        Self {
            name,
            log: log.clone(),
            fail_open: false,
            fail_close: false,
        }
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }
}

#[async_trait]
impl Dependency for MockDependency {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn open(&self, _config: &AppConfig) -> Result<Arc<dyn Handle>, OpenError> {
        self.log.push(format!("open:{}", self.name));
        if self.fail_open {
            return Err(OpenError::connect("connection refused"));
        }
        Ok(Arc::new(MockHandle {
            name: self.name,
            log: self.log.clone(),
            fail_close: self.fail_close,
        }))
    }
}

#[derive(Debug)]
pub struct MockHandle {
    name: &'static str,
    log: EventLog,
    fail_close: bool,
}

#[async_trait]
impl Handle for MockHandle {
    fn name(&self) -> &str {
        self.name
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    async fn ping(&self) -> Result<(), HandleError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), HandleError> {
        self.log.push(format!("close:{}", self.name));
        if self.fail_close {
            Err(HandleError::backend("close failed"))
        } else {
            Ok(())
        }
    }
}

/// Pick a port that is free right now.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// A valid configuration bound to localhost on `port`.
pub fn test_config(port: u16, shutdown_timeout_secs: u64) -> AppConfig {
    let mut config = AppConfig::default();
    config.server.host = "127.0.0.1".into();
    config.server.port = port;
    config.server.shutdown_timeout_secs = shutdown_timeout_secs;
    config.database.url = "postgres://app@localhost/app".into();
    config.cache.url = "redis://127.0.0.1:6379".into();
    config
}

/// Application routes: `/` answers at once, `/dependency` reads a typed handle,
/// `/hold` sleeps for `hold`.
pub fn test_router(hold: Duration) -> impl Fn(&AppConfig, Handles) -> Router + Send + Sync + 'static {
    move |_config, handles| {
        let shared = handles.clone();
        Router::new()
            .route("/", get(|| async { "ok" }))
            .route(
                "/dependency",
                get(move || {
                    let name = shared
                        .get_as::<MockHandle>("database")
                        .map(|h| h.name.to_string())
                        .unwrap_or_default();
                    async move { name }
                }),
            )
            .route(
                "/hold",
                get(move || async move {
                    tokio::time::sleep(hold).await;
                    "released"
                }),
            )
            .merge(service_lifecycle::http::health::routes(handles))
    }
}

/// Wait until the orchestrator reports Running and return the bound address.
pub async fn wait_running(phase: &mut watch::Receiver<LifecyclePhase>) -> std::net::SocketAddr {
    let phase = tokio::time::timeout(
        Duration::from_secs(5),
        phase.wait_for(|p| matches!(p, LifecyclePhase::Running(_))),
    )
    .await
    .expect("orchestrator never reached Running")
    .expect("phase channel closed");

    match *phase {
        LifecyclePhase::Running(addr) => addr,
        other => panic!("unexpected phase {:?}", other),
    }
}
