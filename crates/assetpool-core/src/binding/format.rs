//! Bindings for elements found in formatted rich text.

use std::sync::Arc;

use super::{BindingContext, ContentInputs, ExternalContent, RenderTarget};

/// Attributes moved from the element into the binding's inputs.
const URL_ATTRIBUTES: [&str; 4] = ["src", "href", "xlink:href", "poster"];

/// Take over an already rendered element: its URL attributes become the
/// binding's inputs and are removed so the untreated URLs are never fetched.
///
/// Returns `None` without touching the element when the context names no site.
pub async fn attach_external_content(
    target: Arc<dyn RenderTarget>,
    ctx: BindingContext,
) -> Option<ExternalContent> {
    ctx.site_id.as_ref()?;

    let inputs = ContentInputs {
        url: target
            .attribute("src")
            .or_else(|| target.attribute("href"))
            .or_else(|| target.attribute("xlink:href")),
        poster_url: target.attribute("poster"),
    };
    for attr in URL_ATTRIBUTES {
        target.remove_attribute(attr);
    }

    let binding = ExternalContent::new(target, ctx, inputs);
    binding.attach().await;
    Some(binding)
}

/// Attach every element concurrently; elements are returned in input order.
pub async fn attach_all(
    targets: Vec<Arc<dyn RenderTarget>>,
    ctx: &BindingContext,
) -> Vec<ExternalContent> {
    let pending = targets
        .into_iter()
        .map(|target| attach_external_content(target, ctx.clone()));
    futures_util::future::join_all(pending)
        .await
        .into_iter()
        .flatten()
        .collect()
}
