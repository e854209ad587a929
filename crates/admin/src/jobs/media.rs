//! Product media jobs: attach external videos, then move each product's
//! video to a fixed slot in its gallery.

use std::collections::BTreeMap;
use std::path::PathBuf;

use bulkops_core::{Locale, ResourceKey, ResourceLookup, WorkItem};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{Mutation, MutationPayload, ProductUpdateData, RunOptions, payload_errors, run_mutation};
use crate::executor::Executor;
use crate::fetch::ProductMediaEntry;
use crate::input;
use crate::runner::{FieldMapping, FingerprintPolicy, Row, RunnerConfig, RunnerError, Summary};
use crate::shopify::{GraphQLRequest, GraphQLTransport, UserError, UserErrors, queries};

const ID_COLUMN: &str = "id";
const VIDEO_FIELD: &str = "external_video";
const MEDIA_FIELD: &str = "video_media";
const EXTERNAL_VIDEO: &str = "EXTERNAL_VIDEO";

fn runner_config(label: &str, field: &str, options: RunOptions) -> RunnerConfig {
    let mapping = FieldMapping::column(field, field).with_fingerprint(FingerprintPolicy::None);
    let mut config = RunnerConfig::new(label, Locale::default(), vec![mapping]);
    config.key_column = ID_COLUMN.to_string();
    options.apply(&mut config);
    config
}

fn id_rows<'a>(field: &str, pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Vec<Row> {
    pairs
        .into_iter()
        .map(|(id, value)| {
            Row::from([
                (ID_COLUMN.to_string(), id.to_string()),
                (field.to_string(), value.to_string()),
            ])
        })
        .collect()
}

// =============================================================================
// Add
// =============================================================================

/// `productUpdate(product: {id}, media: [{EXTERNAL_VIDEO, originalSource}])`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProductMediaAdd;

impl Mutation for ProductMediaAdd {
    type Data = ProductUpdateData;

    fn name(&self) -> &'static str {
        "productUpdate"
    }

    fn request(&self, item: &WorkItem) -> GraphQLRequest {
        GraphQLRequest::new(
            queries::PRODUCT_ADD_MEDIA,
            json!({
                "product": { "id": item.resource_key },
                "media": [{
                    "mediaContentType": EXTERNAL_VIDEO,
                    "originalSource": item.value_of(VIDEO_FIELD),
                }],
            }),
        )
    }
}

/// Inputs of a video upload run.
#[derive(Debug, Clone)]
pub struct MediaAddJob {
    /// JSON object mapping product IDs to video URLs.
    pub input: PathBuf,
    pub progress: PathBuf,
    pub options: RunOptions,
}

impl MediaAddJob {
    #[must_use]
    pub fn runner_config(&self) -> RunnerConfig {
        runner_config("media", VIDEO_FIELD, self.options)
    }

    /// Products mapped to an empty URL are left out.
    ///
    /// # Errors
    ///
    /// Returns `RunnerError` if the input cannot be read, the ledger cannot
    /// be written, or a call fails fatally.
    pub async fn run<C: GraphQLTransport>(
        &self,
        executor: &Executor<C>,
    ) -> Result<Summary, RunnerError> {
        let videos: BTreeMap<String, String> = input::read_json(&self.input)?;
        let total = videos.len();
        let videos: Vec<(&str, &str)> = videos
            .iter()
            .filter(|(_, url)| !url.trim().is_empty())
            .map(|(id, url)| (id.as_str(), url.as_str()))
            .collect();
        info!(products = total, with_video = videos.len(), "Loaded product videos");

        let lookup = ResourceLookup::from_keys(videos.iter().map(|(id, _)| ResourceKey::new(*id)));
        run_mutation(
            executor,
            &ProductMediaAdd,
            self.runner_config(),
            &id_rows(VIDEO_FIELD, videos.iter().copied()),
            &lookup,
            &self.progress,
        )
        .await
    }
}

// =============================================================================
// Reorder
// =============================================================================

/// `productReorderMedia(id, moves: [{id, newPosition}])` moving one media
/// item to `position` (0-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductMediaReorder {
    pub position: usize,
}

impl Default for ProductMediaReorder {
    fn default() -> Self {
        Self { position: 1 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductReorderMediaData {
    pub product_reorder_media: Option<MutationPayload>,
}

impl UserErrors for ProductReorderMediaData {
    fn user_errors(&self) -> Vec<UserError> {
        payload_errors("productReorderMedia", self.product_reorder_media.as_ref())
    }
}

impl Mutation for ProductMediaReorder {
    type Data = ProductReorderMediaData;

    fn name(&self) -> &'static str {
        "productReorderMedia"
    }

    fn request(&self, item: &WorkItem) -> GraphQLRequest {
        GraphQLRequest::new(
            queries::PRODUCT_REORDER_MEDIA,
            json!({
                "id": item.resource_key,
                "moves": [{
                    "id": item.value_of(MEDIA_FIELD),
                    "newPosition": self.position.to_string(),
                }],
            }),
        )
    }
}

impl ProductMediaReorder {
    /// The first external video of `product`, unless it is already at
    /// `position` or the product has a single media item.
    #[must_use]
    pub fn video_to_move<'a>(&self, product: &'a ProductMediaEntry) -> Option<&'a str> {
        if product.media.len() < 2 {
            return None;
        }
        let index = product
            .media
            .iter()
            .position(|m| m.media_content_type == EXTERNAL_VIDEO)?;
        (index != self.position).then(|| product.media[index].id.as_str())
    }
}

/// Inputs of a video reorder run.
#[derive(Debug, Clone)]
pub struct MediaReorderJob {
    /// `fetch media` export.
    pub input: PathBuf,
    pub progress: PathBuf,
    pub mutation: ProductMediaReorder,
    pub options: RunOptions,
}

impl MediaReorderJob {
    #[must_use]
    pub fn runner_config(&self) -> RunnerConfig {
        runner_config("media-order", MEDIA_FIELD, self.options)
    }

    /// # Errors
    ///
    /// Returns `RunnerError` if the export cannot be read, the ledger cannot
    /// be written, or a call fails fatally.
    pub async fn run<C: GraphQLTransport>(
        &self,
        executor: &Executor<C>,
    ) -> Result<Summary, RunnerError> {
        let products: Vec<ProductMediaEntry> = input::read_json(&self.input)?;
        let moves: Vec<(&str, &str)> = products
            .iter()
            .filter_map(|p| Some((p.id.as_str(), self.mutation.video_to_move(p)?)))
            .collect();
        info!(
            products = products.len(),
            to_move = moves.len(),
            position = self.mutation.position,
            "Selected videos to reorder"
        );

        let lookup = ResourceLookup::from_keys(moves.iter().map(|(id, _)| ResourceKey::new(*id)));
        run_mutation(
            executor,
            &self.mutation,
            self.runner_config(),
            &id_rows(MEDIA_FIELD, moves.iter().copied()),
            &lookup,
            &self.progress,
        )
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bulkops_core::{ContentDigest, FieldKey, PayloadField};

    use super::*;
    use crate::fetch::MediaEntry;

    fn item(field: &str, value: &str) -> WorkItem {
        WorkItem {
            row: 1,
            resource_key: ResourceKey::new("gid://shopify/Product/5"),
            locale: Locale::default(),
            fields: vec![PayloadField::new(FieldKey::new(field), value, ContentDigest::default())],
        }
    }

    fn product(kinds: &[&str]) -> ProductMediaEntry {
        ProductMediaEntry {
            id: "gid://shopify/Product/5".into(),
            media: kinds
                .iter()
                .enumerate()
                .map(|(i, kind)| MediaEntry {
                    id: format!("gid://shopify/MediaImage/{i}"),
                    media_content_type: (*kind).to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_add_request_shape() {
        let request = ProductMediaAdd.request(&item(VIDEO_FIELD, "https://youtu.be/abc"));
        assert_eq!(
            request.variables,
            json!({
                "product": {"id": "gid://shopify/Product/5"},
                "media": [{"mediaContentType": "EXTERNAL_VIDEO", "originalSource": "https://youtu.be/abc"}]
            })
        );
    }

    #[test]
    fn test_reorder_request_shape() {
        let request = ProductMediaReorder::default().request(&item(MEDIA_FIELD, "gid://shopify/ExternalVideo/9"));
        assert_eq!(
            request.variables,
            json!({
                "id": "gid://shopify/Product/5",
                "moves": [{"id": "gid://shopify/ExternalVideo/9", "newPosition": "1"}]
            })
        );
    }

    #[test]
    fn test_video_to_move() {
        let reorder = ProductMediaReorder::default();
        assert_eq!(
            reorder.video_to_move(&product(&["IMAGE", "IMAGE", "EXTERNAL_VIDEO"])),
            Some("gid://shopify/MediaImage/2")
        );
        assert_eq!(
            reorder.video_to_move(&product(&["EXTERNAL_VIDEO", "IMAGE"])),
            Some("gid://shopify/MediaImage/0")
        );
        // Already in place, no video, or nothing to reorder against.
        assert_eq!(reorder.video_to_move(&product(&["IMAGE", "EXTERNAL_VIDEO"])), None);
        assert_eq!(reorder.video_to_move(&product(&["IMAGE", "IMAGE"])), None);
        assert_eq!(reorder.video_to_move(&product(&["EXTERNAL_VIDEO"])), None);
    }

    #[test]
    fn test_reorder_media_user_errors() {
        let data: ProductReorderMediaData = serde_json::from_value(json!({
            "productReorderMedia": {
                "job": null,
                "mediaUserErrors": [{"field": ["moves", "0", "id"], "message": "Media does not exist"}]
            }
        }))
        .unwrap();
        let errors = data.user_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].to_string(), "moves.0.id: Media does not exist");
    }
}
