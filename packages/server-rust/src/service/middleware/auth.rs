//! Token gate for protected methods.

use std::sync::Arc;

use async_trait::async_trait;
use dynrpc_core::ResponseEnvelope;

use super::filter::{FilterDescriptor, Next, RpcFilter};
use crate::service::context::DispatchContext;
use crate::token::TokenService;

pub const TOKEN_MISSING: &str = "a token is required for this action";
pub const TOKEN_INVALID: &str = "token is invalid or has expired";

/// Rejects calls whose token is absent or fails [`TokenService::validate`].
pub struct TokenAuthFilter {
    tokens: Arc<TokenService>,
}

impl TokenAuthFilter {
    pub const NAME: &'static str = "token-auth";

    #[must_use]
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self { tokens }
    }

    /// Descriptor resolving the [`TokenService`] from the locator per call.
    #[must_use]
    pub fn descriptor() -> FilterDescriptor {
        FilterDescriptor::new(Self::NAME, |locator| {
            Ok(Arc::new(Self::new(locator.require::<TokenService>()?)) as Arc<dyn RpcFilter>)
        })
    }
}

#[async_trait]
impl RpcFilter for TokenAuthFilter {
    async fn handle(&self, mut ctx: DispatchContext, next: Next) -> DispatchContext {
        let rejection = match ctx.token() {
            None => Some(TOKEN_MISSING),
            Some(token) if !self.tokens.validate(token) => Some(TOKEN_INVALID),
            Some(_) => None,
        };
        if let Some(message) = rejection {
            tracing::debug!(request_id = %ctx.request_id, reason = message, "token rejected");
            ctx.short_circuit(ResponseEnvelope::failure(message));
            return ctx;
        }
        next.run(ctx).await
    }
}
