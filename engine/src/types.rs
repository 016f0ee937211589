use serde::{Deserialize, Serialize};

/// A stored image as the grouping engine reads it. The engine never
/// mutates records; missing embeddings or subject labels simply exclude a
/// record from the output.
#[derive(Debug, Clone)]
pub struct ImageRecord {
    /// Storage-side identifier.
    pub id: i64,

    /// Embedding serialized as little-endian f32 bytes, if computed.
    pub embedding: Option<Vec<u8>>,

    /// Primary subject label, if classified.
    pub object_category: Option<String>,

    /// Background/setting label, if classified.
    pub background_category: Option<String>,
}

/// One discovered cluster of images.
///
/// Identifiers are call-scoped sequence numbers: they restart at 0 on
/// every grouping call and carry no cross-call identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterGroup {
    #[serde(rename = "cluster_id")]
    pub cluster_id: i64,

    /// Display name, e.g. "cat - indoor" or "dog - outdoor (group 2)".
    #[serde(rename = "category_name")]
    pub category_name: String,

    #[serde(rename = "object_category")]
    pub object_category: String,

    #[serde(rename = "background_category")]
    pub background_category: Option<String>,

    /// Arithmetic mean of member embeddings (or the k-means center).
    #[serde(rename = "centroid")]
    pub centroid: Vec<f32>,

    /// Member images in their original relative order.
    #[serde(rename = "image_ids")]
    pub image_ids: Vec<i64>,
}

/// Clusters nested under one subject label (the secondary presentation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectGroup {
    #[serde(rename = "object_category")]
    pub object_category: String,

    /// Sum of member counts across `subgroups`.
    #[serde(rename = "total_images")]
    pub total_images: usize,

    #[serde(rename = "subgroups")]
    pub subgroups: Vec<ClusterGroup>,
}

/// Everything the core derives from one uploaded image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestedImage {
    #[serde(rename = "width")]
    pub width: u32,

    #[serde(rename = "height")]
    pub height: u32,

    /// Embedding serialized as little-endian f32 bytes, ready for storage.
    #[serde(rename = "embedding")]
    pub embedding: Vec<u8>,

    #[serde(rename = "object_category")]
    pub object_category: String,

    #[serde(rename = "background_category")]
    pub background_category: String,

    /// Declared content type, defaulted when the caller sent none.
    #[serde(rename = "content_type")]
    pub content_type: String,

    #[serde(rename = "size_bytes")]
    pub size_bytes: usize,
}
