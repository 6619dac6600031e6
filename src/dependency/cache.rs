//! Redis connection.

use std::any::Any;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;

use crate::config::AppConfig;
use crate::dependency::handle::{Dependency, Handle, HandleError, OpenError};

/// Opens the `cache` section of the configuration as a multiplexed Redis connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheDependency;

#[async_trait]
impl Dependency for CacheDependency {
    fn name(&self) -> &'static str {
        "cache"
    }

    async fn open(&self, config: &AppConfig) -> Result<Arc<dyn Handle>, OpenError> {
        let timeout = config.cache.connect_timeout();
        let client = redis::Client::open(config.cache.url.as_str())
            .map_err(|e| OpenError::InvalidParams(e.to_string()))?;

        let conn = tokio::time::timeout(timeout, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| OpenError::Timeout(timeout))?
            .map_err(OpenError::connect)?;

        if let Err(e) = ping(conn.clone(), timeout).await {
            return Err(OpenError::NotReady(e.to_string()));
        }

        tracing::debug!("Cache connection ready");
        Ok(Arc::new(CacheHandle {
            conn: Mutex::new(Some(conn)),
            timeout,
        }))
    }
}

/// An open Redis connection.
pub struct CacheHandle {
    conn: Mutex<Option<MultiplexedConnection>>,
    timeout: Duration,
}

impl CacheHandle {
    /// A clone of the live connection, or `None` once closed.
    pub fn connection(&self) -> Option<MultiplexedConnection> {
        self.conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl std::fmt::Debug for CacheHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheHandle")
            .field("open", &self.connection().is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait]
impl Handle for CacheHandle {
    fn name(&self) -> &str {
        "cache"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn ping(&self) -> Result<(), HandleError> {
        let conn = self.connection().ok_or(HandleError::Closed)?;
        ping(conn, self.timeout).await
    }

    async fn close(&self) -> Result<(), HandleError> {
        let conn = self
            .conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        // Dropping the last clone closes the socket.
        match conn {
            Some(_) => Ok(()),
            None => Err(HandleError::Closed),
        }
    }
}

async fn ping(mut conn: MultiplexedConnection, timeout: Duration) -> Result<(), HandleError> {
    let reply: String = tokio::time::timeout(timeout, redis::cmd("PING").query_async(&mut conn))
        .await
        .map_err(|_| HandleError::Timeout(timeout))?
        .map_err(HandleError::backend)?;

    if reply == "PONG" {
        Ok(())
    } else {
        Err(HandleError::backend(format!("unexpected PING reply `{}`", reply)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::Handles;
    use std::time::Instant;

    fn config(url: String) -> AppConfig {
        let mut config = AppConfig::default();
        config.cache.url = url;
        config.cache.connect_timeout_secs = 1;
        config
    }

    #[tokio::test]
    async fn open_against_closed_port_fails_within_timeout() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let config = config(format!("redis://127.0.0.1:{}", port));

        let started = Instant::now();
        let err = CacheDependency.open(&config).await.unwrap_err();

        assert!(matches!(err, OpenError::Timeout(_) | OpenError::Connect(_)), "{:?}", err);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn malformed_url_is_invalid_params() {
        let err = CacheDependency
            .open(&config("redis://localhost:99999".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, OpenError::InvalidParams(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn closed_handle_reports_closed() {
        let handles: Handles = [Arc::new(CacheHandle {
            conn: Mutex::new(None),
            timeout: Duration::from_secs(1),
        }) as Arc<dyn Handle>]
        .into_iter()
        .collect();

        let cache = handles.get_as::<CacheHandle>("cache").unwrap();
        assert!(cache.connection().is_none());
        assert!(matches!(cache.close().await, Err(HandleError::Closed)));
        assert!(matches!(cache.ping().await, Err(HandleError::Closed)));
    }
}
