//! Decorator generation for `async_trait` client traits.

/// Implements a client trait for [`Resilient<Client>`](crate::client::Resilient)
/// by forwarding every method through the breaker and retry policy.
///
/// Every listed method must be an `async fn(&self, ..)` returning
/// `ReliabilityResult<_>`, and every argument must be `Clone` since it is
/// passed again on each attempt. The operation name used in logs, metrics and
/// telemetry is the method name.
///
/// ```
/// use integrations_reliability::client::{wrap, Resilient};
/// use integrations_reliability::resilience::{CircuitBreaker, CircuitBreakerConfig, RetryConfig};
/// use integrations_reliability::{resilient_impl, ReliabilityResult};
/// use async_trait::async_trait;
/// use std::sync::Arc;
///
/// #[async_trait]
/// pub trait ChatApi: Send + Sync {
///     async fn complete(&self, prompt: String, max_tokens: u32) -> ReliabilityResult<String>;
/// }
///
/// pub struct HttpChat;
///
/// #[async_trait]
/// impl ChatApi for HttpChat {
///     async fn complete(&self, prompt: String, _max_tokens: u32) -> ReliabilityResult<String> {
///         Ok(prompt.to_uppercase())
///     }
/// }
///
/// resilient_impl! {
///     impl ChatApi for HttpChat {
///         async fn complete(&self, prompt: String, max_tokens: u32) -> ReliabilityResult<String>;
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig::model_inference()));
/// let chat: Resilient<HttpChat> = wrap(HttpChat, breaker, RetryConfig::default());
/// let api: &dyn ChatApi = &chat;
/// assert_eq!(api.complete("hi".to_string(), 16).await.unwrap(), "HI");
/// # });
/// ```
#[macro_export]
macro_rules! resilient_impl {
    (
        impl $($trait:ident)::+ for $client:ty { $($body:tt)* }
    ) => {
        $crate::resilient_impl! {
            @impl ($($trait)::+) ($client) { $($body)* }
        }
    };
    (
        @impl ($tr:path) ($client:ty) {
            $(
                $(#[$meta:meta])*
                async fn $method:ident(&self $(, $arg:ident : $arg_ty:ty)*) -> $ret:ty;
            )*
        }
    ) => {
        #[$crate::__private::async_trait]
        impl $tr for $crate::client::Resilient<$client> {
            $(
                $(#[$meta])*
                async fn $method(&self $(, $arg: $arg_ty)*) -> $ret {
                    self.call(::core::stringify!($method), |inner| {
                        <$client as $tr>::$method(
                            inner
                            $(, ::core::clone::Clone::clone(&$arg))*
                        )
                    })
                    .await
                }
            )*
        }
    };
}
