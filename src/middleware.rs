//! Tower integration: run admission in front of any `http` service.
//!
//! [`AdmissionLayer`] wraps a service taking `http::Request<B>`. Admitted requests reach
//! the inner service with their [`RequestContext`] stored in the request extensions;
//! denied requests are answered by a [`DenialResponder`] and never reach it.

use crate::config::PipelineConfig;
use crate::error::Denial;
use crate::pipeline::AdmissionPipeline;
use crate::request::RequestContext;
use futures::future::BoxFuture;
use http::{Request, Response};
use std::sync::Arc;
use tower_service::Service;
use tracing::{error, info};

/// Turns a denial into the response sent to the client.
pub trait DenialResponder: Send + Sync {
    fn respond(&self, denial: &Denial) -> Response<String>;
}

impl<F> DenialResponder for F
where
    F: Fn(&Denial) -> Response<String> + Send + Sync,
{
    fn respond(&self, denial: &Denial) -> Response<String> {
        (self)(denial)
    }
}

/// Default responder: `{"message": ..., "code": ...}` with the denial's status and headers.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonResponder;

impl DenialResponder for JsonResponder {
    fn respond(&self, denial: &Denial) -> Response<String> {
        denial.into_response()
    }
}

/// Layer that applies the admission pipeline to every request.
#[derive(Clone)]
pub struct AdmissionLayer {
    pipeline: Arc<AdmissionPipeline>,
    responder: Arc<dyn DenialResponder>,
}

impl AdmissionLayer {
    pub fn new(config: PipelineConfig) -> Self {
        Self::from_pipeline(AdmissionPipeline::new(Arc::new(config)))
    }

    pub fn from_pipeline(pipeline: AdmissionPipeline) -> Self {
        Self { pipeline: Arc::new(pipeline), responder: Arc::new(JsonResponder) }
    }

    /// Replace the JSON responder.
    pub fn with_responder(mut self, responder: impl DenialResponder + 'static) -> Self {
        self.responder = Arc::new(responder);
        self
    }

    pub fn pipeline(&self) -> &AdmissionPipeline {
        &self.pipeline
    }
}

impl std::fmt::Debug for AdmissionLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionLayer").field("pipeline", &self.pipeline).finish_non_exhaustive()
    }
}

impl<S> tower_layer::Layer<S> for AdmissionLayer {
    type Service = AdmissionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AdmissionService {
            inner,
            pipeline: self.pipeline.clone(),
            responder: self.responder.clone(),
        }
    }
}

/// Service produced by [`AdmissionLayer`].
#[derive(Clone)]
pub struct AdmissionService<S> {
    inner: S,
    pipeline: Arc<AdmissionPipeline>,
    responder: Arc<dyn DenialResponder>,
}

impl<S> AdmissionService<S> {
    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for AdmissionService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: From<String> + Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let pipeline = self.pipeline.clone();
        let responder = self.responder.clone();
        let inner = self.inner.clone();
        Box::pin(async move {
            let (mut parts, body) = req.into_parts();
            match pipeline.admit(&parts).await {
                Ok(ctx) => {
                    parts.extensions.insert::<RequestContext>(ctx);
                    let mut inner = inner;
                    inner.call(Request::from_parts(parts, body)).await
                }
                Err(denial) => {
                    log_denial(&denial, &parts);
                    Ok(responder.respond(&denial).map(ResBody::from))
                }
            }
        })
    }
}

fn log_denial(denial: &Denial, parts: &http::request::Parts) {
    if denial.status().is_server_error() {
        error!(method = %parts.method, uri = %parts.uri, error = %denial, "admission failed");
    } else {
        info!(
            method = %parts.method,
            uri = %parts.uri,
            status = denial.status().as_u16(),
            code = denial.code(),
            "request denied"
        );
    }
}
