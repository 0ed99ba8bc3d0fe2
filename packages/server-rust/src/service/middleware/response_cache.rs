//! Opt-in caching of successful responses for configured methods.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dynrpc_core::ResponseEnvelope;
use quick_cache::sync::Cache;

use super::filter::{FilterDescriptor, Next, RpcFilter};
use crate::service::context::DispatchContext;
use crate::service::descriptor::TypeDescriptor;

#[derive(Clone)]
struct CachedResponse {
    response: ResponseEnvelope,
    expires_at: Instant,
}

/// Bounded response cache keyed by target, action, arguments and token.
pub struct ResponseCache {
    entries: Cache<String, CachedResponse>,
    keys: BTreeSet<String>,
    ttl: Duration,
}

impl ResponseCache {
    /// `keys` are lowercased `Type.Method` or `Type` names, short or full.
    #[must_use]
    pub fn new(keys: BTreeSet<String>, capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: Cache::new(capacity.max(1)),
            keys,
            ttl,
        }
    }

    /// Whether responses of `target.method` may be cached.
    #[must_use]
    pub fn is_eligible(&self, target: &TypeDescriptor, method: &str) -> bool {
        let short = target.short_name();
        let full = target.name();
        [
            format!("{short}.{method}"),
            format!("{full}.{method}"),
            short.to_string(),
            full.to_string(),
        ]
        .iter()
        .any(|key| self.keys.contains(&key.to_ascii_lowercase()))
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<ResponseEnvelope> {
        let hit = self.entries.get(key)?;
        if hit.expires_at > Instant::now() {
            return Some(hit.response);
        }
        self.entries.remove(key);
        None
    }

    pub fn insert(&self, key: String, response: ResponseEnvelope) {
        let expires_at = Instant::now() + self.ttl;
        self.entries.insert(key, CachedResponse { response, expires_at });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn cache_key(ctx: &DispatchContext) -> String {
    format!(
        "{}::{}::{}::{}",
        ctx.target.name(),
        ctx.method.name(),
        ctx.request.params.canonical(),
        ctx.token().unwrap_or_default()
    )
}

// ---------------------------------------------------------------------------
// ResponseCacheFilter
// ---------------------------------------------------------------------------

/// Serves eligible calls from the [`ResponseCache`] found in the locator and
/// stores successful responses.
pub struct ResponseCacheFilter {
    cache: Arc<ResponseCache>,
}

impl ResponseCacheFilter {
    pub const NAME: &'static str = "response-cache";

    #[must_use]
    pub fn new(cache: Arc<ResponseCache>) -> Self {
        Self { cache }
    }

    #[must_use]
    pub fn descriptor() -> FilterDescriptor {
        FilterDescriptor::new(Self::NAME, |locator| {
            Ok(Arc::new(Self::new(locator.require::<ResponseCache>()?)) as Arc<dyn RpcFilter>)
        })
    }
}

#[async_trait]
impl RpcFilter for ResponseCacheFilter {
    async fn handle(&self, mut ctx: DispatchContext, next: Next) -> DispatchContext {
        if !self.cache.is_eligible(&ctx.target, ctx.method.name()) {
            return next.run(ctx).await;
        }

        let key = cache_key(&ctx);
        if let Some(hit) = self.cache.get(&key) {
            tracing::debug!(request_id = %ctx.request_id, "response cache hit");
            ctx.short_circuit(hit);
            return ctx;
        }

        let ctx = next.run(ctx).await;
        if !ctx.response.is_failure() {
            self.cache.insert(key, ctx.response.clone());
        }
        ctx
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use dynrpc_core::{CODE_SUCCESS, TypeShape};
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::service::descriptor::{Args, MethodDescriptor, ParamDef};
    use crate::service::invoker::Invoker;
    use crate::service::middleware::build_pipeline;
    use crate::service::middleware::testing::{echo_type, sample_context, sample_context_with};

    fn cache_for(keys: &[&str], ttl: Duration) -> Arc<ResponseCache> {
        let keys = keys.iter().map(|k| k.to_ascii_lowercase()).collect();
        Arc::new(ResponseCache::new(keys, 16, ttl))
    }

    #[test]
    fn eligibility_accepts_short_full_and_type_keys() {
        let ty = echo_type();
        assert!(cache_for(&["Echo.Say"], Duration::from_secs(1)).is_eligible(&ty, "Say"));
        assert!(cache_for(&["demo.echo.say"], Duration::from_secs(1)).is_eligible(&ty, "Say"));
        assert!(cache_for(&["echo"], Duration::from_secs(1)).is_eligible(&ty, "Other"));
        assert!(!cache_for(&["Echo.Other"], Duration::from_secs(1)).is_eligible(&ty, "Say"));
    }

    #[test]
    fn expired_entries_are_dropped_on_read() {
        let cache = cache_for(&[], Duration::ZERO);
        cache.insert("k".into(), ResponseEnvelope::success(json!(1)));
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn second_identical_call_is_served_from_cache() {
        static CALLS: AtomicU32 = AtomicU32::new(0);

        struct Counter;
        let ty = Arc::new(
            TypeDescriptor::named("demo.Counter")
                .constructor(|_| Ok(Counter))
                .method(
                    MethodDescriptor::new("Next")
                        .param(ParamDef::new("step", TypeShape::int()))
                        .handler(|_: &Counter, _: Args| Ok(CALLS.fetch_add(1, Ordering::SeqCst))),
                ),
        );

        let cache = cache_for(&["Counter.Next"], Duration::from_secs(60));
        let filters: Vec<Arc<dyn RpcFilter>> =
            vec![Arc::new(ResponseCacheFilter::new(Arc::clone(&cache)))];

        let make = || {
            let mut ctx = sample_context_with(None, vec![json!(1)]);
            ctx.target = Arc::clone(&ty);
            ctx.method = Arc::clone(&ty.methods()[0]);
            ctx
        };

        let first = build_pipeline(&filters, Invoker::default())
            .oneshot(make())
            .await
            .unwrap();
        let second = build_pipeline(&filters, Invoker::default())
            .oneshot(make())
            .await
            .unwrap();

        assert_eq!(first.response.code, CODE_SUCCESS);
        assert_eq!(first.response.data, second.response.data);
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn tokens_partition_the_cache() {
        let cache = cache_for(&["Echo"], Duration::from_secs(60));
        let filters: Vec<Arc<dyn RpcFilter>> =
            vec![Arc::new(ResponseCacheFilter::new(Arc::clone(&cache)))];

        for token in [None, Some("a.b.c")] {
            build_pipeline(&filters, Invoker::default())
                .oneshot(sample_context_with(token, vec![json!("hi")]))
                .await
                .unwrap();
        }
        assert_eq!(cache.len(), 2);

        let ctx = build_pipeline(&filters, Invoker::default())
            .oneshot(sample_context())
            .await
            .unwrap();
        assert_eq!(ctx.response.data, json!("hi"));
        assert_eq!(cache.len(), 2);
    }
}
