#![allow(dead_code)]

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use jsonwebtoken::{encode, EncodingKey, Header};
use restgate::{CacheError, ThrottleCache};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const JWT_SECRET: &str = "integration-secret-at-least-32-bytes!";

pub fn basic_header(id: &str, secret: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{id}:{secret}")))
}

pub fn bearer_header(claims: serde_json::Value) -> String {
    let token =
        encode(&Header::default(), &claims, &EncodingKey::from_secret(JWT_SECRET.as_bytes()))
            .unwrap();
    format!("Bearer {token}")
}

/// Cache whose every call fails.
#[derive(Default)]
pub struct BrokenCache {
    pub calls: AtomicUsize,
}

#[async_trait]
impl ThrottleCache for BrokenCache {
    async fn get(&self, _key: &str) -> Result<Option<Vec<f64>>, CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Backend("connection refused".into()))
    }

    async fn set(&self, _key: &str, _history: Vec<f64>, _ttl: Duration) -> Result<(), CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Backend("connection refused".into()))
    }
}

/// Cache that never answers within any reasonable timeout.
pub struct StalledCache;

#[async_trait]
impl ThrottleCache for StalledCache {
    async fn get(&self, _key: &str) -> Result<Option<Vec<f64>>, CacheError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(None)
    }

    async fn set(&self, _key: &str, _history: Vec<f64>, _ttl: Duration) -> Result<(), CacheError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }
}
