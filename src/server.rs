//! Method registration and call dispatch.
//!
//! A [`ServiceBinder`] collects the methods of one service type together
//! with the [`ServiceFactory`] that creates an instance per call. Binders
//! are added to a [`ServerBuilder`], which checks the hosting transport and
//! produces an immutable [`GrpcServer`]. The host hands every accepted call
//! to [`GrpcServer::handle`].

use std::{collections::HashMap, fmt, future::Future, io, sync::Arc};

use bytes::Bytes;
use futures::FutureExt;
use tokio::sync::mpsc;

use crate::{
    call::{
        self,
        BoundRoute,
        CallParts,
        Route,
        ShapeFn,
        Unimplemented,
        run_client_streaming,
        run_duplex,
        run_server_streaming,
        run_unary,
    },
    config::ServerOptions,
    context::ServerCallContext,
    error::{HandlerResult, Result, ServerError},
    method::{Method, MethodType, ServiceFactory},
    request::{RequestBody, Streaming, body_channel},
    response::ResponseSink,
    transport::{IncomingCall, TransportCapabilities},
};

type RouteTable = HashMap<String, Arc<dyn Route>>;

/// Registration table for the methods of service type `S`.
///
/// # Examples
///
/// ```
/// use grpcframe::{
///     method::{Method, MethodType},
///     server::ServiceBinder,
/// };
///
/// #[derive(Clone, Default)]
/// struct Greeter;
///
/// let say_hello: Method<String, String> =
///     Method::bincode(MethodType::Unary, "demo.Greeter", "SayHello");
/// let binder = ServiceBinder::new(Greeter::default)
///     .unary(&say_hello, |_svc: Greeter, name: String, _ctx| async move {
///         Ok(format!("hello {name}"))
///     })
///     .expect("route registers");
/// assert_eq!(binder.len(), 1);
/// ```
pub struct ServiceBinder<S> {
    factory: Arc<dyn ServiceFactory<S>>,
    routes: RouteTable,
}

impl<S: Send + 'static> ServiceBinder<S> {
    /// Start a binder whose calls get instances from `factory`.
    pub fn new(factory: impl ServiceFactory<S>) -> Self {
        Self {
            factory: Arc::new(factory),
            routes: HashMap::new(),
        }
    }

    /// Number of methods bound so far.
    #[must_use]
    pub fn len(&self) -> usize { self.routes.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.routes.is_empty() }

    /// Bind a unary method.
    ///
    /// The handler may return the response or `Option<Resp>`; `None` ends the
    /// call as cancelled with no response.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::DuplicateRoute`] if the method's path is
    /// already bound.
    pub fn unary<Req, Resp, R, F, Fut>(self, method: &Method<Req, Resp>, handler: F) -> Result<Self>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
        R: Into<Option<Resp>> + Send + 'static,
        F: Fn(S, Req, ServerCallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<R>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let requests = method.request_marshaller();
        let responses = method.response_marshaller();
        let shape: ShapeFn<S> = Arc::new(move |service: S, parts: CallParts| {
            run_unary(
                Arc::clone(&handler),
                Arc::clone(&requests),
                Arc::clone(&responses),
                service,
                parts,
            )
            .boxed()
        });
        self.bind(method, MethodType::Unary, shape)
    }

    /// Bind a client-streaming method.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::DuplicateRoute`] if the method's path is
    /// already bound.
    pub fn client_streaming<Req, Resp, R, F, Fut>(
        self,
        method: &Method<Req, Resp>,
        handler: F,
    ) -> Result<Self>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
        R: Into<Option<Resp>> + Send + 'static,
        F: Fn(S, Streaming<Req>, ServerCallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<R>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let requests = method.request_marshaller();
        let responses = method.response_marshaller();
        let shape: ShapeFn<S> = Arc::new(move |service: S, parts: CallParts| {
            run_client_streaming(
                Arc::clone(&handler),
                Arc::clone(&requests),
                Arc::clone(&responses),
                service,
                parts,
            )
            .boxed()
        });
        self.bind(method, MethodType::ClientStreaming, shape)
    }

    /// Bind a server-streaming method.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::DuplicateRoute`] if the method's path is
    /// already bound.
    pub fn server_streaming<Req, Resp, F, Fut>(
        self,
        method: &Method<Req, Resp>,
        handler: F,
    ) -> Result<Self>
    where
        Req: Send + 'static,
        Resp: 'static,
        F: Fn(S, Req, ResponseSink<Resp>, ServerCallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<()>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let requests = method.request_marshaller();
        let responses = method.response_marshaller();
        let shape: ShapeFn<S> = Arc::new(move |service: S, parts: CallParts| {
            run_server_streaming(
                Arc::clone(&handler),
                Arc::clone(&requests),
                Arc::clone(&responses),
                service,
                parts,
            )
            .boxed()
        });
        self.bind(method, MethodType::ServerStreaming, shape)
    }

    /// Bind a duplex-streaming method.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::DuplicateRoute`] if the method's path is
    /// already bound.
    pub fn duplex_streaming<Req, Resp, F, Fut>(
        self,
        method: &Method<Req, Resp>,
        handler: F,
    ) -> Result<Self>
    where
        Req: Send + 'static,
        Resp: 'static,
        F: Fn(S, Streaming<Req>, ResponseSink<Resp>, ServerCallContext) -> Fut
            + Send
            + Sync
            + 'static,
        Fut: Future<Output = HandlerResult<()>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let requests = method.request_marshaller();
        let responses = method.response_marshaller();
        let shape: ShapeFn<S> = Arc::new(move |service: S, parts: CallParts| {
            run_duplex(
                Arc::clone(&handler),
                Arc::clone(&requests),
                Arc::clone(&responses),
                service,
                parts,
            )
            .boxed()
        });
        self.bind(method, MethodType::DuplexStreaming, shape)
    }

    fn bind<Req, Resp>(
        mut self,
        method: &Method<Req, Resp>,
        shape_type: MethodType,
        shape: ShapeFn<S>,
    ) -> Result<Self> {
        let path = method.path();
        if self.routes.contains_key(&path) {
            return Err(ServerError::DuplicateRoute(path));
        }
        if method.method_type() != shape_type {
            log::warn!(
                "method {path} is declared {} but bound as {shape_type}",
                method.method_type()
            );
        }
        let route = BoundRoute::new(shape_type, Arc::clone(&self.factory), shape);
        self.routes.insert(path, Arc::new(route));
        Ok(self)
    }
}

impl<S> fmt::Debug for ServiceBinder<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceBinder")
            .field("routes", &self.routes.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Collects services and options for a [`GrpcServer`].
#[derive(Default)]
pub struct ServerBuilder {
    routes: RouteTable,
    options: ServerOptions,
}

impl ServerBuilder {
    /// Replace the server options.
    #[must_use]
    pub fn options(mut self, options: ServerOptions) -> Self {
        self.options = options;
        self
    }

    /// Add every method bound in `binder`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::DuplicateRoute`] if any path is already served.
    pub fn add_service<S>(mut self, binder: ServiceBinder<S>) -> Result<Self> {
        if binder.routes.is_empty() {
            log::warn!("adding a service with no bound methods");
        }
        for (path, route) in binder.routes {
            if self.routes.contains_key(&path) {
                return Err(ServerError::DuplicateRoute(path));
            }
            self.routes.insert(path, route);
        }
        Ok(self)
    }

    /// Finish configuration for a transport with the given capabilities.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::TrailersUnsupported`] if the transport cannot
    /// send trailers.
    pub fn build(self, transport: &impl TransportCapabilities) -> Result<GrpcServer> {
        if !transport.supports_trailers() {
            return Err(ServerError::TrailersUnsupported);
        }
        log::debug!("gRPC server built with {} methods", self.routes.len());
        Ok(GrpcServer {
            routes: Arc::new(self.routes),
            options: self.options,
        })
    }
}

impl fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerBuilder")
            .field("routes", &self.routes.keys().collect::<Vec<_>>())
            .field("options", &self.options)
            .finish()
    }
}

/// Immutable dispatch table shared by all calls.
///
/// Cloning is cheap.
#[derive(Clone)]
pub struct GrpcServer {
    routes: Arc<RouteTable>,
    options: ServerOptions,
}

impl GrpcServer {
    #[must_use]
    pub fn builder() -> ServerBuilder { ServerBuilder::default() }

    #[must_use]
    pub fn options(&self) -> &ServerOptions { &self.options }

    /// Create a request body channel sized by the server options.
    #[must_use]
    pub fn body_channel(&self) -> (mpsc::Sender<io::Result<Bytes>>, RequestBody) {
        body_channel(self.options.channel_capacity())
    }

    /// Whether a method is bound at `path`.
    #[must_use]
    pub fn serves(&self, path: &str) -> bool { self.routes.contains_key(path) }

    /// Serve one call through to its trailers.
    ///
    /// Every outcome of the bound method, including faults, panics and
    /// cancellation, is reported to the client as a status.
    ///
    /// # Errors
    ///
    /// Returns a [`ServerError`] only when the terminal response could not be
    /// written; the host should reset the stream.
    pub async fn handle(&self, call: IncomingCall) -> Result<()> {
        let route = self.routes.get(call.head.path()).map_or_else(
            || {
                tracing::debug!(path = call.head.path(), "no method bound for path");
                Arc::new(Unimplemented) as Arc<dyn Route>
            },
            Arc::clone,
        );
        call::run_call(route, call, self.options).await
    }
}

impl fmt::Debug for GrpcServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrpcServer")
            .field("routes", &self.routes.keys().collect::<Vec<_>>())
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::{GrpcServer, ServiceBinder};
    use crate::{
        error::ServerError,
        marshaller::RawMarshaller,
        method::{Method, MethodType},
        transport::TransportCapabilities,
    };

    struct Caps(bool);

    impl TransportCapabilities for Caps {
        fn supports_trailers(&self) -> bool { self.0 }
    }

    fn echo() -> Method<Bytes, Bytes> {
        Method::new(MethodType::Unary, "test.Echo", "Echo", RawMarshaller, RawMarshaller)
    }

    fn binder() -> ServiceBinder<()> {
        ServiceBinder::new(|| ())
            .unary(&echo(), |(), req: Bytes, _ctx| async move { Ok(req) })
            .expect("bind echo")
    }

    #[test]
    fn duplicate_method_in_one_binder_is_rejected() {
        let err = binder()
            .unary(&echo(), |(), req: Bytes, _ctx| async move { Ok(req) })
            .expect_err("duplicate");
        assert!(matches!(err, ServerError::DuplicateRoute(path) if path == "/test.Echo/Echo"));
    }

    #[test]
    fn duplicate_method_across_services_is_rejected() {
        let err = GrpcServer::builder()
            .add_service(binder())
            .and_then(|b| b.add_service(binder()))
            .expect_err("duplicate");
        assert!(matches!(err, ServerError::DuplicateRoute(_)));
    }

    #[test]
    fn transports_without_trailers_are_refused() {
        let err = GrpcServer::builder()
            .add_service(binder())
            .expect("add")
            .build(&Caps(false))
            .expect_err("trailers are required");
        assert!(matches!(err, ServerError::TrailersUnsupported));
    }

    #[test]
    fn built_server_serves_bound_paths() {
        let server = GrpcServer::builder()
            .add_service(binder())
            .expect("add")
            .build(&Caps(true))
            .expect("build");
        assert!(server.serves("/test.Echo/Echo"));
        assert!(!server.serves("/test.Echo/Missing"));
    }
}
