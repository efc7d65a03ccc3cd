//! Resolver for runs without AppView access.

use super::{EmbedView, RemoteViewResolver, ResolverError};
use async_trait::async_trait;

/// Answers every lookup with `EmbedView::None`; holds no state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OfflineViewResolver;

#[async_trait]
impl RemoteViewResolver for OfflineViewResolver {
    async fn resolve(&self, _actor_id: &str, _record_key: &str) -> Result<EmbedView, ResolverError> {
        Ok(EmbedView::None)
    }
}

#[cfg(test)]
mod tests {
    use super::OfflineViewResolver;
    use crate::resolver::{EmbedView, RemoteViewResolver};

    #[tokio::test]
    async fn every_lookup_yields_no_embed_and_keeps_nothing() {
        assert_eq!(std::mem::size_of::<OfflineViewResolver>(), 0);

        let resolver = OfflineViewResolver;
        for index in 0..10_000 {
            let view = resolver
                .resolve("did:plc:abc", &format!("3k{index}"))
                .await
                .unwrap();
            assert_eq!(view, EmbedView::None);
        }
    }
}
