//! Method descriptors and service activation.
//!
//! A [`Method`] names a remote procedure, fixes its [`MethodType`] and carries
//! the marshallers for its request and response types. Bound methods receive
//! a service instance created by a [`ServiceFactory`] once per call.

use std::{borrow::Cow, fmt, sync::Arc};

use crate::marshaller::{BincodeMarshaller, Marshaller, Message};

/// Call shape of a method.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MethodType {
    /// One request message, one response message.
    Unary,
    /// A stream of request messages, one response message.
    ClientStreaming,
    /// One request message, a stream of response messages.
    ServerStreaming,
    /// Independent request and response streams.
    DuplexStreaming,
}

impl MethodType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unary => "unary",
            Self::ClientStreaming => "client_streaming",
            Self::ServerStreaming => "server_streaming",
            Self::DuplexStreaming => "duplex_streaming",
        }
    }
}

impl fmt::Display for MethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Descriptor of a remote method with request type `Req` and response type
/// `Resp`.
///
/// # Examples
///
/// ```
/// use grpcframe::method::{Method, MethodType};
///
/// let method: Method<String, u64> = Method::bincode(MethodType::Unary, "demo.Counter", "Count");
/// assert_eq!(method.full_name(), "demo.Counter/Count");
/// assert_eq!(method.path(), "/demo.Counter/Count");
/// ```
pub struct Method<Req, Resp> {
    method_type: MethodType,
    service: Cow<'static, str>,
    name: Cow<'static, str>,
    request_marshaller: Arc<dyn Marshaller<Req>>,
    response_marshaller: Arc<dyn Marshaller<Resp>>,
}

impl<Req, Resp> Method<Req, Resp> {
    /// Describe a method with explicit marshallers.
    #[must_use]
    pub fn new(
        method_type: MethodType,
        service: impl Into<Cow<'static, str>>,
        name: impl Into<Cow<'static, str>>,
        request_marshaller: impl Marshaller<Req>,
        response_marshaller: impl Marshaller<Resp>,
    ) -> Self {
        Self {
            method_type,
            service: service.into(),
            name: name.into(),
            request_marshaller: Arc::new(request_marshaller),
            response_marshaller: Arc::new(response_marshaller),
        }
    }

    #[must_use]
    pub fn method_type(&self) -> MethodType { self.method_type }

    #[must_use]
    pub fn service(&self) -> &str { &self.service }

    #[must_use]
    pub fn name(&self) -> &str { &self.name }

    /// `<service>/<method>`, as reported by the call context.
    #[must_use]
    pub fn full_name(&self) -> String { format!("{}/{}", self.service, self.name) }

    /// Request path the method is routed on.
    #[must_use]
    pub fn path(&self) -> String { format!("/{}/{}", self.service, self.name) }

    pub(crate) fn request_marshaller(&self) -> Arc<dyn Marshaller<Req>> {
        Arc::clone(&self.request_marshaller)
    }

    pub(crate) fn response_marshaller(&self) -> Arc<dyn Marshaller<Resp>> {
        Arc::clone(&self.response_marshaller)
    }
}

impl<Req, Resp> Method<Req, Resp>
where
    Req: Message + 'static,
    Resp: Message + 'static,
{
    /// Describe a method whose messages are encoded with bincode.
    #[must_use]
    pub fn bincode(
        method_type: MethodType,
        service: impl Into<Cow<'static, str>>,
        name: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::new(method_type, service, name, BincodeMarshaller, BincodeMarshaller)
    }
}

impl<Req, Resp> Clone for Method<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            method_type: self.method_type,
            service: self.service.clone(),
            name: self.name.clone(),
            request_marshaller: Arc::clone(&self.request_marshaller),
            response_marshaller: Arc::clone(&self.response_marshaller),
        }
    }
}

impl<Req, Resp> fmt::Debug for Method<Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("method_type", &self.method_type)
            .field("service", &self.service)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Creates the service instance that handles one call.
///
/// Any `Fn() -> S` closure is a factory.
pub trait ServiceFactory<S>: Send + Sync + 'static {
    /// Create the instance for a new call.
    fn create(&self) -> S;
}

impl<S, F> ServiceFactory<S> for F
where
    F: Fn() -> S + Send + Sync + 'static,
{
    fn create(&self) -> S { self() }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::{Method, MethodType, ServiceFactory};
    use crate::marshaller::RawMarshaller;

    #[test]
    fn names_and_paths() {
        let method: Method<Bytes, Bytes> = Method::new(
            MethodType::DuplexStreaming,
            "pkg.Echo",
            "Chat",
            RawMarshaller,
            RawMarshaller,
        );
        assert_eq!(method.full_name(), "pkg.Echo/Chat");
        assert_eq!(method.path(), "/pkg.Echo/Chat");
        assert_eq!(method.method_type().to_string(), "duplex_streaming");
    }

    #[test]
    fn closures_are_factories() {
        let factory = || 41_u8 + 1;
        assert_eq!(factory.create(), 42);
    }
}
