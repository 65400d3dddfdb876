pub mod client;

pub use client::Client;
pub use client::RetryPolicy;
use thiserror::Error;

/// Error type for client operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("failed: {status}: {body}")]
    FailedWithBody {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("unexpected response")]
    UnexpectedResponse,
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid URL scheme: {0} (expected http or https)")]
    InvalidScheme(String),
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::State as AxumState,
        http::StatusCode as AxumStatusCode,
        routing::{get, post},
        Router,
    };
    use farmsteam_server::{Api, Backend, Store};
    use farmsteam_types::{baseline_state, Document, ReferralOutcome, REFERRAL_BONUS};
    use serde_json::json;
    use std::{
        net::SocketAddr,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };
    use tokio::time::{sleep, Duration};

    struct TestContext {
        backend: Arc<Backend>,
        base_url: String,
        server_handle: tokio::task::JoinHandle<()>,
    }

    impl TestContext {
        async fn new() -> Self {
            let store = Store::open_in_memory().unwrap();
            let backend = Arc::new(Backend::new(store));
            let api = Api::new(backend.clone());

            // Start server on random port
            let addr = SocketAddr::from(([127, 0, 0, 1], 0));
            let router = api.router();
            let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
            let actual_addr = listener.local_addr().unwrap();
            let base_url = format!("http://{actual_addr}");

            let server_handle = tokio::spawn(async move {
                axum::serve(listener, router.into_make_service())
                    .await
                    .unwrap();
            });

            // Give server time to start
            sleep(Duration::from_millis(100)).await;

            Self {
                backend,
                base_url,
                server_handle,
            }
        }

        fn create_client(&self) -> Client {
            Client::new(&self.base_url).unwrap()
        }
    }

    impl Drop for TestContext {
        fn drop(&mut self) {
            self.server_handle.abort();
        }
    }

    fn document(value: serde_json::Value) -> Document {
        match value {
            serde_json::Value::Object(fields) => fields,
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_client_unknown_user_gets_baseline() {
        let ctx = TestContext::new().await;
        let client = ctx.create_client();

        let state = client.get_state("nobody").await.unwrap();
        assert_eq!(state, baseline_state());
    }

    #[tokio::test]
    async fn test_client_state_roundtrip() {
        let ctx = TestContext::new().await;
        let client = ctx.create_client();

        let save = document(json!({ "coins": 50, "petName": "Miu" }));
        client.save_state("u1", &save).await.unwrap();

        let state = client.get_state("u1").await.unwrap();
        assert_eq!(state["coins"], json!(50));
        assert_eq!(state["petName"], json!("Miu"));
        // Unsaved fields come back at their baseline defaults.
        assert_eq!(state["energy"], json!(10));
        assert_eq!(state["clickLevel"], json!(1));
        assert_eq!(state.len(), 19);
    }

    #[tokio::test]
    async fn test_client_second_save_overwrites_first() {
        let ctx = TestContext::new().await;
        let client = ctx.create_client();

        client
            .save_state("u1", &document(json!({ "coins": 50, "level": 9 })))
            .await
            .unwrap();
        client
            .save_state("u1", &document(json!({ "coins": 75 })))
            .await
            .unwrap();

        let state = client.get_state("u1").await.unwrap();
        assert_eq!(state["coins"], json!(75));
        assert_eq!(state["level"], json!(1));
    }

    #[tokio::test]
    async fn test_client_referral_flow() {
        let ctx = TestContext::new().await;
        let client = ctx.create_client();

        // First registration grants the bonus to both parties.
        let outcome = client.register_referral("alice", "bob").await.unwrap();
        assert_eq!(
            outcome,
            ReferralOutcome::Registered {
                bonus: REFERRAL_BONUS
            }
        );
        let alice = client.get_state("alice").await.unwrap();
        let bob = client.get_state("bob").await.unwrap();
        assert_eq!(alice["coins"], json!(REFERRAL_BONUS));
        assert_eq!(bob["coins"], json!(REFERRAL_BONUS));

        // Repeat registration (even with another referrer) changes nothing.
        let outcome = client.register_referral("carol", "bob").await.unwrap();
        assert_eq!(outcome, ReferralOutcome::AlreadyRegistered);
        let bob = client.get_state("bob").await.unwrap();
        assert_eq!(bob["coins"], json!(REFERRAL_BONUS));
        assert_eq!(
            ctx.backend.store().referrer_of("bob").unwrap().as_deref(),
            Some("alice")
        );
    }

    #[tokio::test]
    async fn test_client_self_referral_rejected() {
        let ctx = TestContext::new().await;
        let client = ctx.create_client();

        let err = client.register_referral("bob", "bob").await.unwrap_err();
        let Error::FailedWithBody { status, body } = err else {
            panic!("expected FailedWithBody, got {err:?}");
        };
        assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
        assert!(body.contains("self_referral"));
        assert_eq!(client.get_state("bob").await.unwrap(), baseline_state());
    }

    #[tokio::test]
    async fn test_client_healthz() {
        let ctx = TestContext::new().await;
        let client = ctx.create_client();
        client.healthz().await.unwrap();
    }

    #[test]
    fn test_client_invalid_scheme() {
        // Test invalid scheme
        let result = Client::new("ftp://example.com");
        assert!(result.is_err());
        if let Err(err) = result {
            assert!(matches!(err, Error::InvalidScheme(_)));
            assert_eq!(
                err.to_string(),
                "invalid URL scheme: ftp (expected http or https)"
            );
        }

        // Test valid http scheme
        let result = Client::new("http://localhost:8080");
        assert!(result.is_ok());

        // Test valid https scheme
        let result = Client::new("https://localhost:8080");
        assert!(result.is_ok());
    }

    async fn serve_router(router: Router) -> (String, tokio::task::JoinHandle<()>) {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
        let actual_addr = listener.local_addr().unwrap();
        let base_url = format!("http://{actual_addr}");

        let handle = tokio::spawn(async move {
            axum::serve(listener, router.into_make_service())
                .await
                .unwrap();
        });

        sleep(Duration::from_millis(50)).await;
        (base_url, handle)
    }

    #[tokio::test]
    async fn test_get_with_retry_retries_retryable_statuses() {
        let counter = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/flaky",
                get(
                    |AxumState(counter): AxumState<Arc<AtomicUsize>>| async move {
                        let attempt = counter.fetch_add(1, Ordering::SeqCst);
                        if attempt < 2 {
                            AxumStatusCode::SERVICE_UNAVAILABLE
                        } else {
                            AxumStatusCode::OK
                        }
                    },
                ),
            )
            .with_state(counter.clone());

        let (base_url, handle) = serve_router(router).await;
        let client = Client::new(&base_url)
            .unwrap()
            .with_retry_policy(RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::ZERO,
                max_backoff: Duration::ZERO,
                retry_non_idempotent: false,
            });

        let url = client.base_url.join("flaky").unwrap();
        let response = client.get_with_retry(url).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        handle.abort();
    }

    #[tokio::test]
    async fn test_get_with_retry_retries_connection_errors() {
        // Reserve a port, then release it so the first attempts are refused.
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
        let actual_addr = listener.local_addr().unwrap();
        drop(listener);

        let handle = tokio::spawn(async move {
            sleep(Duration::from_millis(100)).await;
            let listener = tokio::net::TcpListener::bind(actual_addr).await.unwrap();
            let router = Router::new().route("/ping", get(|| async { AxumStatusCode::OK }));
            axum::serve(listener, router.into_make_service())
                .await
                .unwrap();
        });

        let client = Client::new(&format!("http://{actual_addr}"))
            .unwrap()
            .with_retry_policy(RetryPolicy {
                max_attempts: 5,
                initial_backoff: Duration::from_millis(50),
                max_backoff: Duration::from_millis(200),
                retry_non_idempotent: false,
            });

        let url = client.base_url.join("ping").unwrap();
        let response = client.get_with_retry(url).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        handle.abort();
    }

    #[tokio::test]
    async fn test_post_with_retry_respects_retry_non_idempotent_default() {
        let counter = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/flaky-post",
                post(
                    |AxumState(counter): AxumState<Arc<AtomicUsize>>,
                     _body: axum::body::Bytes| async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        AxumStatusCode::SERVICE_UNAVAILABLE
                    },
                ),
            )
            .with_state(counter.clone());

        let (base_url, handle) = serve_router(router).await;
        let client = Client::new(&base_url)
            .unwrap()
            .with_retry_policy(RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::ZERO,
                max_backoff: Duration::ZERO,
                retry_non_idempotent: false,
            });

        let url = client.base_url.join("flaky-post").unwrap();
        let err = client
            .post_json_with_retry(url.clone(), &json!({ "hi": true }))
            .await
            .expect_err("POST should not be retried by default");
        let Error::FailedWithBody { status, body } = err else {
            panic!("expected FailedWithBody, got {err:?}");
        };
        assert_eq!(status, reqwest::StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.contains("POST"));
        assert!(body.contains(url.as_str()));
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        handle.abort();
    }

    #[tokio::test]
    async fn test_post_with_retry_retries_when_enabled() {
        let counter = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/flaky-post",
                post(
                    |AxumState(counter): AxumState<Arc<AtomicUsize>>,
                     _body: axum::body::Bytes| async move {
                        let attempt = counter.fetch_add(1, Ordering::SeqCst);
                        if attempt < 2 {
                            AxumStatusCode::SERVICE_UNAVAILABLE
                        } else {
                            AxumStatusCode::OK
                        }
                    },
                ),
            )
            .with_state(counter.clone());

        let (base_url, handle) = serve_router(router).await;
        let client = Client::new(&base_url)
            .unwrap()
            .with_retry_policy(RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::ZERO,
                max_backoff: Duration::ZERO,
                retry_non_idempotent: true,
            });

        let url = client.base_url.join("flaky-post").unwrap();
        client
            .post_json_with_retry(url, &json!({ "hi": true }))
            .await
            .expect("POST should succeed after retry");
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        handle.abort();
    }
}
