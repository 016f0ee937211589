//! Hierarchical grouping: categorical partitioning, then geometric
//! sub-clustering inside each partition.

use std::collections::HashMap;

use shoebox_cluster::{mean, Clusterer, NOISE};

use crate::codec;
use crate::types::{ClusterGroup, ImageRecord, SubjectGroup};
use crate::EngineError;

/// Background label used when a record was never background-classified.
pub const UNKNOWN_BACKGROUND: &str = "unknown";

/// Builds the full ordered cluster list for the current image collection.
///
/// Records lacking an embedding or a subject label are omitted, not
/// errors. Partitions iterate in first-seen order of their
/// (subject, background) pair; inside a partition, sub-clusters emit in
/// ascending label order with an outlier group last. Cluster ids are
/// call-scoped sequence numbers.
pub fn build_clusters(
    records: &[ImageRecord],
    clusterer: &Clusterer,
) -> Result<Vec<ClusterGroup>, EngineError> {
    let mut order: Vec<(String, String)> = Vec::new();
    let mut partitions: HashMap<(String, String), Vec<(i64, Vec<f32>)>> = HashMap::new();

    for record in records {
        let (Some(bytes), Some(subject)) = (&record.embedding, &record.object_category) else {
            continue;
        };
        let background = record
            .background_category
            .clone()
            .unwrap_or_else(|| UNKNOWN_BACKGROUND.to_string());

        let embedding = codec::embedding_from_bytes(bytes)?;
        let key = (subject.clone(), background);
        let slot = partitions.entry(key.clone()).or_default();
        if slot.is_empty() {
            order.push(key);
        }
        slot.push((record.id, embedding));
    }

    let mut clusters: Vec<ClusterGroup> = Vec::new();

    for key in &order {
        let (subject, background) = key;
        let members = &partitions[key];
        let plain_name = format!("{subject} - {background}");

        if members.len() == 1 {
            let (id, embedding) = &members[0];
            clusters.push(group(
                clusters.len(),
                plain_name,
                subject,
                background,
                embedding.clone(),
                vec![*id],
            ));
            continue;
        }

        let matrix: Vec<Vec<f32>> = members.iter().map(|(_, e)| e.clone()).collect();
        let result = clusterer.cluster(&matrix);

        if result.centroids.is_empty() {
            // No structure found: the whole partition is one group and the
            // noise labeling is not surfaced.
            let refs: Vec<&[f32]> = matrix.iter().map(Vec::as_slice).collect();
            clusters.push(group(
                clusters.len(),
                plain_name,
                subject,
                background,
                mean(&refs),
                members.iter().map(|(id, _)| *id).collect(),
            ));
            continue;
        }

        let n_real = result.n_clusters();
        for label in 0..n_real as i32 {
            let image_ids: Vec<i64> = members
                .iter()
                .zip(&result.labels)
                .filter(|&(_, &l)| l == label)
                .map(|((id, _), _)| *id)
                .collect();

            let name = if n_real > 1 {
                format!("{subject} - {background} (group {})", label + 1)
            } else {
                plain_name.clone()
            };
            clusters.push(group(
                clusters.len(),
                name,
                subject,
                background,
                result.centroids[label as usize].clone(),
                image_ids,
            ));
        }

        let noise: Vec<(i64, &[f32])> = members
            .iter()
            .zip(&result.labels)
            .filter(|&(_, &l)| l == NOISE)
            .map(|((id, e), _)| (*id, e.as_slice()))
            .collect();
        if !noise.is_empty() {
            let embeddings: Vec<&[f32]> = noise.iter().map(|(_, e)| *e).collect();
            clusters.push(group(
                clusters.len(),
                format!("{subject} - {background} (outliers)"),
                subject,
                background,
                mean(&embeddings),
                noise.iter().map(|(id, _)| *id).collect(),
            ));
        }
    }

    tracing::debug!(
        records = records.len(),
        partitions = order.len(),
        clusters = clusters.len(),
        "built cluster list"
    );
    Ok(clusters)
}

/// Runs [`build_clusters`] on the blocking pool.
pub async fn build_clusters_offloaded(
    records: Vec<ImageRecord>,
    clusterer: Clusterer,
) -> Result<Vec<ClusterGroup>, EngineError> {
    tokio::task::spawn_blocking(move || build_clusters(&records, &clusterer))
        .await
        .map_err(|e| EngineError::Offload(e.to_string()))?
}

/// Nests a flat cluster list under subject labels, sorted by subject.
pub fn group_by_subject(clusters: Vec<ClusterGroup>) -> Vec<SubjectGroup> {
    let mut groups: Vec<SubjectGroup> = Vec::new();

    for cluster in clusters {
        let subject = cluster.object_category.clone();
        match groups.iter_mut().find(|g| g.object_category == subject) {
            Some(existing) => {
                existing.total_images += cluster.image_ids.len();
                existing.subgroups.push(cluster);
            }
            None => groups.push(SubjectGroup {
                object_category: subject,
                total_images: cluster.image_ids.len(),
                subgroups: vec![cluster],
            }),
        }
    }

    groups.sort_by(|a, b| a.object_category.cmp(&b.object_category));
    groups
}

fn group(
    seq: usize,
    category_name: String,
    subject: &str,
    background: &str,
    centroid: Vec<f32>,
    image_ids: Vec<i64>,
) -> ClusterGroup {
    ClusterGroup {
        cluster_id: seq as i64,
        category_name,
        object_category: subject.to_string(),
        background_category: Some(background.to_string()),
        centroid,
        image_ids,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::embedding_to_bytes;
    use shoebox_cluster::{ClusterConfig, Method};

    fn record(id: i64, emb: &[f32], subject: &str, background: Option<&str>) -> ImageRecord {
        ImageRecord {
            id,
            embedding: Some(embedding_to_bytes(emb)),
            object_category: Some(subject.to_string()),
            background_category: background.map(str::to_string),
        }
    }

    fn default_clusterer() -> Clusterer {
        Clusterer::new(ClusterConfig::default())
    }

    #[test]
    fn empty_collection_empty_result() {
        let clusters = build_clusters(&[], &default_clusterer()).unwrap();
        assert!(clusters.is_empty());
    }

    #[test]
    fn records_without_embedding_or_subject_are_omitted() {
        let records = vec![
            ImageRecord {
                id: 1,
                embedding: None,
                object_category: Some("cat".into()),
                background_category: Some("indoor".into()),
            },
            ImageRecord {
                id: 2,
                embedding: Some(embedding_to_bytes(&[1.0, 0.0])),
                object_category: None,
                background_category: Some("indoor".into()),
            },
            record(3, &[0.5, 0.5], "cat", Some("indoor")),
        ];

        let clusters = build_clusters(&records, &default_clusterer()).unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].image_ids, vec![3]);
    }

    #[test]
    fn singleton_partition() {
        let records = vec![record(7, &[0.1, 0.9], "cat", Some("indoor"))];

        let clusters = build_clusters(&records, &default_clusterer()).unwrap();
        assert_eq!(clusters.len(), 1);

        let c = &clusters[0];
        assert_eq!(c.cluster_id, 0);
        assert_eq!(c.category_name, "cat - indoor");
        assert_eq!(c.object_category, "cat");
        assert_eq!(c.background_category.as_deref(), Some("indoor"));
        assert_eq!(c.centroid, vec![0.1, 0.9]);
        assert_eq!(c.image_ids, vec![7]);
    }

    #[test]
    fn missing_background_becomes_unknown() {
        let records = vec![record(1, &[1.0, 0.0], "cat", None)];

        let clusters = build_clusters(&records, &default_clusterer()).unwrap();
        assert_eq!(clusters[0].category_name, "cat - unknown");
        assert_eq!(clusters[0].background_category.as_deref(), Some("unknown"));
    }

    #[test]
    fn two_tight_groups_split_with_group_names() {
        // Scenario: five dog/outdoor images in two tight geometric groups.
        let records = vec![
            record(1, &[0.0, 0.0], "dog", Some("outdoor")),
            record(2, &[0.05, 0.0], "dog", Some("outdoor")),
            record(3, &[0.0, 0.05], "dog", Some("outdoor")),
            record(4, &[10.0, 10.0], "dog", Some("outdoor")),
            record(5, &[10.05, 10.0], "dog", Some("outdoor")),
        ];

        let clusters = build_clusters(&records, &default_clusterer()).unwrap();
        assert_eq!(clusters.len(), 2, "{clusters:#?}");

        assert_eq!(clusters[0].category_name, "dog - outdoor (group 1)");
        assert_eq!(clusters[0].image_ids, vec![1, 2, 3]);
        assert_eq!(clusters[1].category_name, "dog - outdoor (group 2)");
        assert_eq!(clusters[1].image_ids, vec![4, 5]);
        assert_eq!(clusters[1].cluster_id, 1);
    }

    #[test]
    fn all_noise_partition_collapses_to_one_group() {
        // Three mutually distant embeddings: density clustering finds no
        // structure, so the partition stays whole.
        let records = vec![
            record(1, &[0.0, 0.0], "bird", Some("nature")),
            record(2, &[50.0, 0.0], "bird", Some("nature")),
            record(3, &[0.0, 50.0], "bird", Some("nature")),
        ];

        let clusters = build_clusters(&records, &default_clusterer()).unwrap();
        assert_eq!(clusters.len(), 1);

        let c = &clusters[0];
        assert_eq!(c.category_name, "bird - nature");
        assert_eq!(c.image_ids, vec![1, 2, 3]);
        for (got, want) in c.centroid.iter().zip(&[50.0 / 3.0, 50.0 / 3.0]) {
            assert!((got - want).abs() < 1e-4, "{got} vs {want}");
        }
    }

    #[test]
    fn noise_points_get_an_outliers_group() {
        let mut records = vec![
            record(1, &[0.0, 0.0], "dog", Some("outdoor")),
            record(2, &[0.05, 0.0], "dog", Some("outdoor")),
            record(3, &[0.0, 0.05], "dog", Some("outdoor")),
            record(4, &[10.0, 10.0], "dog", Some("outdoor")),
            record(5, &[10.05, 10.0], "dog", Some("outdoor")),
            record(6, &[10.0, 10.05], "dog", Some("outdoor")),
        ];
        records.push(record(9, &[300.0, 300.0], "dog", Some("outdoor")));

        let clusters = build_clusters(&records, &default_clusterer()).unwrap();
        assert_eq!(clusters.len(), 3, "{clusters:#?}");

        let outliers = clusters.last().unwrap();
        assert_eq!(outliers.category_name, "dog - outdoor (outliers)");
        assert_eq!(outliers.image_ids, vec![9]);
        assert_eq!(outliers.centroid, vec![300.0, 300.0]);

        // The outlier appears nowhere else.
        for c in &clusters[..2] {
            assert!(!c.image_ids.contains(&9));
        }
    }

    #[test]
    fn partitions_iterate_in_first_seen_order() {
        let records = vec![
            record(1, &[1.0, 0.0], "dog", Some("outdoor")),
            record(2, &[0.0, 1.0], "cat", Some("indoor")),
            record(3, &[0.9, 0.1], "dog", Some("indoor")),
        ];

        let clusters = build_clusters(&records, &default_clusterer()).unwrap();
        let names: Vec<&str> = clusters.iter().map(|c| c.category_name.as_str()).collect();
        assert_eq!(names, vec!["dog - outdoor", "cat - indoor", "dog - indoor"]);

        let ids: Vec<i64> = clusters.iter().map(|c| c.cluster_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn kmeans_covers_every_member_exactly_once() {
        let records = vec![
            record(1, &[0.0, 0.0], "car", Some("urban")),
            record(2, &[0.1, 0.0], "car", Some("urban")),
            record(3, &[9.0, 9.0], "car", Some("urban")),
            record(4, &[9.1, 9.0], "car", Some("urban")),
        ];

        let clusterer = Clusterer::new(ClusterConfig {
            method: Method::Kmeans,
            n_clusters: 2,
            ..ClusterConfig::default()
        });
        let clusters = build_clusters(&records, &clusterer).unwrap();

        let mut seen: Vec<i64> = clusters.iter().flat_map(|c| c.image_ids.clone()).collect();
        seen.sort();
        assert_eq!(seen, vec![1, 2, 3, 4]);
    }

    #[test]
    fn malformed_embedding_fails_the_query() {
        let records = vec![ImageRecord {
            id: 1,
            embedding: Some(vec![1, 2, 3]),
            object_category: Some("cat".into()),
            background_category: None,
        }];

        let err = build_clusters(&records, &default_clusterer()).unwrap_err();
        assert!(matches!(err, EngineError::BadEmbedding(3)));
    }

    #[test]
    fn grouped_view_totals_and_sorting() {
        let records = vec![
            record(1, &[1.0, 0.0], "dog", Some("outdoor")),
            record(2, &[0.0, 1.0], "cat", Some("indoor")),
            record(3, &[0.9, 0.1], "dog", Some("indoor")),
            record(4, &[0.1, 0.9], "cat", Some("indoor")),
        ];

        let clusters = build_clusters(&records, &default_clusterer()).unwrap();
        let grouped = group_by_subject(clusters);

        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].object_category, "cat");
        assert_eq!(grouped[1].object_category, "dog");

        for subject in &grouped {
            let total: usize = subject.subgroups.iter().map(|c| c.image_ids.len()).sum();
            assert_eq!(subject.total_images, total);
        }
        assert_eq!(grouped[0].total_images, 2);
        assert_eq!(grouped[1].total_images, 2);
    }

    #[test]
    fn cluster_group_serializes_with_wire_names() {
        let clusters = build_clusters(
            &[record(1, &[0.5, 0.5], "cat", Some("indoor"))],
            &default_clusterer(),
        )
        .unwrap();

        let json = serde_json::to_value(&clusters[0]).unwrap();
        assert_eq!(json["cluster_id"], 0);
        assert_eq!(json["category_name"], "cat - indoor");
        assert_eq!(json["image_ids"][0], 1);
        assert!(json["centroid"].is_array());
    }
}
