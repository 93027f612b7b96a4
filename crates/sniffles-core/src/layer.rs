//! Tower middleware
//!
//! Wraps any `tower::Service<http::Request<B>>` that answers with an
//! `http::Response<ResBody>`. The wrapped client builds requests and parses
//! responses exactly as before.
//!
//! Errors are surfaced as [`tower::BoxError`]. Transport errors are only
//! converted with `Into<BoxError>`, so downcasting to the original error type
//! still works; injected failures downcast to [`SimulatedFault`].

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower::{BoxError, Layer, Service};

use crate::error::{InterceptError, SimulatedFault};
use crate::interceptor::Sniffles;
use crate::record::RequestSummary;

/// Layer that routes every call through a [`Sniffles`] instance
#[derive(Debug, Clone)]
pub struct SnifflesLayer {
    sniffles: Sniffles,
}

impl SnifflesLayer {
    pub fn new(sniffles: Sniffles) -> Self {
        Self { sniffles }
    }
}

impl<S> Layer<S> for SnifflesLayer {
    type Service = SnifflesService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SnifflesService {
            inner,
            sniffles: self.sniffles.clone(),
        }
    }
}

/// Service produced by [`SnifflesLayer`]
#[derive(Debug, Clone)]
pub struct SnifflesService<S> {
    inner: S,
    sniffles: Sniffles,
}

impl<S> SnifflesService<S> {
    pub fn sniffles(&self) -> &Sniffles {
        &self.sniffles
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, ReqBody, ResBody> Service<http::Request<ReqBody>> for SnifflesService<S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
    S::Error: Into<BoxError>,
    ReqBody: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = http::Response<ResBody>;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, request: http::Request<ReqBody>) -> Self::Future {
        // Keep the instance that was driven to readiness
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let sniffles = self.sniffles.clone();
        let summary = RequestSummary::from(&request);

        Box::pin(async move {
            sniffles
                .intercept(summary, move || inner.call(request))
                .await
                .map_err(|err| match err {
                    InterceptError::Simulated(fault) => Box::new(fault) as BoxError,
                    InterceptError::Transport(err) => err.into(),
                })
        })
    }
}

/// True if `err` was injected by the fault policy rather than the transport
pub fn is_simulated(err: &BoxError) -> bool {
    simulated_fault(err).is_some()
}

/// The injected fault behind `err`, if any
pub fn simulated_fault(err: &BoxError) -> Option<SimulatedFault> {
    err.downcast_ref::<SimulatedFault>().copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::FailureKind;
    use crate::record::CallRecord;
    use std::convert::Infallible;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::{service_fn, ServiceBuilder, ServiceExt};

    type Request = http::Request<String>;
    type Response = http::Response<String>;

    fn request(uri: &str) -> Request {
        http::Request::get(uri).body(String::new()).unwrap()
    }

    /// Transport stub answering 200 and counting invocations
    fn counting_transport(
        calls: Arc<AtomicUsize>,
    ) -> impl Service<Request, Response = Response, Error = Infallible, Future = impl Send> + Clone
    {
        service_fn(move |req: Request| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let body = format!("hello from {}", req.uri().path());
                Ok::<_, Infallible>(http::Response::new(body))
            }
        })
    }

    #[tokio::test]
    async fn test_passthrough_is_transparent() {
        let sniffles = Sniffles::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let service = ServiceBuilder::new()
            .layer(sniffles.layer())
            .service(counting_transport(Arc::clone(&calls)));

        let response = service
            .oneshot(request("http://api.test/users"))
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(response.body(), "hello from /users");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let record = sniffles.latest_record().unwrap();
        assert_eq!(record.url, "http://api.test/users");
        assert_eq!(record.method, "GET");
        assert_eq!(record.status_code, 200);
    }

    #[tokio::test]
    async fn test_server_error_never_reaches_transport() {
        let sniffles = Sniffles::new();
        sniffles.set_failure(true, FailureKind::ServerError);
        let calls = Arc::new(AtomicUsize::new(0));
        let service = sniffles
            .layer()
            .layer(counting_transport(Arc::clone(&calls)));

        let response = service.oneshot(request("http://api.test/a")).await.unwrap();

        assert_eq!(response.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.status().canonical_reason(),
            Some("Internal Server Error")
        );
        assert!(response.body().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(sniffles.latest_record().unwrap().status_code, 500);
    }

    #[tokio::test]
    async fn test_simulated_faults_downcast() {
        let sniffles = Sniffles::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let service = sniffles.layer().layer(counting_transport(Arc::clone(&calls)));

        sniffles.set_failure(true, FailureKind::Network);
        let err = service
            .clone()
            .oneshot(request("http://api.test/a"))
            .await
            .unwrap_err();
        assert_eq!(simulated_fault(&err), Some(SimulatedFault::Network));
        assert_eq!(err.to_string(), "Simulated network failure");

        sniffles.set_failure(true, FailureKind::Timeout);
        let err = service
            .oneshot(request("http://api.test/b"))
            .await
            .unwrap_err();
        assert_eq!(simulated_fault(&err), Some(SimulatedFault::Timeout));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let history = sniffles.request_history();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(CallRecord::is_failure));
    }

    #[tokio::test]
    async fn test_transport_error_passes_through() {
        let sniffles = Sniffles::new();
        let failing = service_fn(|_req: Request| async {
            Err::<Response, _>(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
        });
        let service = sniffles.layer().layer(failing);

        let err = service
            .oneshot(request("http://api.test/a"))
            .await
            .unwrap_err();

        assert!(!is_simulated(&err));
        let io_err = err.downcast_ref::<io::Error>().unwrap();
        assert_eq!(io_err.kind(), io::ErrorKind::ConnectionRefused);
        assert_eq!(sniffles.latest_record().unwrap().status_code, -1);
    }

    #[tokio::test]
    async fn test_delay_through_layer() {
        let sniffles = Sniffles::new();
        sniffles.set_delay(Duration::from_millis(200));
        let calls = Arc::new(AtomicUsize::new(0));
        let service = sniffles.layer().layer(counting_transport(calls));

        service.oneshot(request("http://api.test/a")).await.unwrap();
        assert!(sniffles.latest_record().unwrap().duration_ms >= 200);
    }

    #[tokio::test]
    async fn test_one_instance_shared_by_many_clients() {
        let sniffles = Sniffles::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let first = sniffles.layer().layer(counting_transport(Arc::clone(&calls)));
        let second = sniffles.layer().layer(counting_transport(Arc::clone(&calls)));

        first.oneshot(request("http://one.test/")).await.unwrap();
        second.oneshot(request("http://two.test/")).await.unwrap();

        let urls: Vec<_> = sniffles
            .request_history()
            .into_iter()
            .map(|r| r.url)
            .collect();
        assert_eq!(urls, vec!["http://one.test/", "http://two.test/"]);
    }
}
