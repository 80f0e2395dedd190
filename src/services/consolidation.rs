//! Consolidation (C8): groups near-duplicate observations, scoped to one
//! entity or run globally, by union-find clustering over pairwise cosine
//! similarity.

use crate::models::embedding::cosine_similarity;
use crate::models::entity::EntityId;
use crate::models::observation::ObservationId;
use crate::repositories::EntityRepository;
use crate::services::index::SemanticIndex;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Lower bound of the similarity threshold accepted by [`ConsolidationService::consolidate`].
pub const MIN_THRESHOLD: f64 = 0.5;
/// Upper bound of the similarity threshold accepted by [`ConsolidationService::consolidate`].
pub const MAX_THRESHOLD: f64 = 1.0;

/// One observation grouped into a cluster.
#[derive(Debug, Clone)]
pub struct ClusterMember {
    /// The owning entity's id.
    pub entity_id: EntityId,
    /// The owning entity's name.
    pub entity_name: String,
    /// The member observation's id.
    pub observation_id: ObservationId,
    /// The member observation's content at embed time.
    pub content: String,
}

/// A group of two or more observations joined, directly or transitively, by
/// similarity at or above the requested threshold.
#[derive(Debug, Clone)]
pub struct Cluster {
    /// The clustered observations.
    pub members: Vec<ClusterMember>,
    /// Mean pairwise cosine similarity across every pair in the cluster,
    /// including pairs that fall below the threshold but were joined
    /// transitively through a shared third member. Rounded to 3 decimals.
    pub avg_similarity: f64,
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent[ra] = rb;
        }
    }
}

/// Implements union-find consolidation clustering (C8).
pub struct ConsolidationService {
    index: Arc<SemanticIndex>,
    entities: Arc<EntityRepository>,
}

impl ConsolidationService {
    /// Builds a consolidation service over the given semantic index and
    /// entity repository.
    #[must_use]
    pub fn new(index: Arc<SemanticIndex>, entities: Arc<EntityRepository>) -> Self {
        Self { index, entities }
    }

    /// Clusters embeddings (scoped to `entity_id`, or every embedding in the
    /// store if `None`) whose pairwise similarity reaches `threshold`
    /// (clamped to [`MIN_THRESHOLD`]-[`MAX_THRESHOLD`]). Singleton clusters
    /// are dropped; the remaining clusters are sorted by member count,
    /// descending.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] if `threshold` lies outside
    /// `[`[`MIN_THRESHOLD`]`, `[`MAX_THRESHOLD`]`]`, and propagates any store
    /// failure.
    pub fn consolidate(&self, entity_id: Option<&EntityId>, threshold: f64) -> Result<Vec<Cluster>> {
        if !(MIN_THRESHOLD..=MAX_THRESHOLD).contains(&threshold) {
            return Err(Error::InvalidInput(format!(
                "threshold must be in [{MIN_THRESHOLD}, {MAX_THRESHOLD}], got {threshold}"
            )));
        }

        let rows = self.index.list_by_entity(entity_id)?;
        let n = rows.len();
        if n < 2 {
            return Ok(Vec::new());
        }

        let mut pairwise = vec![vec![0.0f64; n]; n];
        let mut uf = UnionFind::new(n);
        for i in 0..n {
            for j in (i + 1)..n {
                let similarity = cosine_similarity(&rows[i].vector, &rows[j].vector);
                pairwise[i][j] = similarity;
                pairwise[j][i] = similarity;
                if similarity >= threshold {
                    uf.union(i, j);
                }
            }
        }

        let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
        for i in 0..n {
            groups.entry(uf.find(i)).or_default().push(i);
        }

        let mut name_cache: HashMap<EntityId, String> = HashMap::new();
        let mut clusters = Vec::new();

        for indices in groups.values() {
            if indices.len() < 2 {
                continue;
            }

            let mut pair_sum = 0.0;
            let mut pair_count = 0usize;
            for (a_pos, &a) in indices.iter().enumerate() {
                for &b in &indices[(a_pos + 1)..] {
                    pair_sum += pairwise[a][b];
                    pair_count += 1;
                }
            }
            let avg = if pair_count == 0 {
                1.0
            } else {
                pair_sum / pair_count as f64
            };

            let mut members = Vec::with_capacity(indices.len());
            for &i in indices {
                let row = &rows[i];
                let entity_name = match name_cache.get(&row.entity_id) {
                    Some(name) => name.clone(),
                    None => {
                        let name = self
                            .entities
                            .find_by_id(&row.entity_id)?
                            .map(|e| e.name)
                            .unwrap_or_default();
                        name_cache.insert(row.entity_id.clone(), name.clone());
                        name
                    }
                };
                members.push(ClusterMember {
                    entity_id: row.entity_id.clone(),
                    entity_name,
                    observation_id: row.observation_id.clone(),
                    content: row.text_content.clone(),
                });
            }

            clusters.push(Cluster {
                members,
                avg_similarity: (avg * 1000.0).round() / 1000.0,
            });
        }

        clusters.sort_by(|a, b| b.members.len().cmp(&a.members.len()));
        Ok(clusters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::ObservationRepository;
    use crate::storage::Store;

    fn unit(mut v: Vec<f32>) -> Vec<f32> {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        for x in &mut v {
            *x /= norm;
        }
        v
    }

    #[test]
    fn rejects_threshold_out_of_range() {
        let store = Arc::new(Store::open_in_memory_for_tests().unwrap());
        let entities = Arc::new(EntityRepository::new(store.clone()));
        let index = Arc::new(SemanticIndex::new(store));
        let svc = ConsolidationService::new(index, entities);
        assert!(svc.consolidate(None, 0.2).is_err());
        assert!(svc.consolidate(None, 1.1).is_err());
    }

    #[test]
    fn singleton_clusters_are_dropped() {
        let store = Arc::new(Store::open_in_memory_for_tests().unwrap());
        let entities = Arc::new(EntityRepository::new(store.clone()));
        let observations = ObservationRepository::new(store.clone());
        let index = Arc::new(SemanticIndex::new(store));
        let svc = ConsolidationService::new(index.clone(), entities.clone());

        let e = entities.find_or_create("k", None).unwrap();
        let obs = observations.create(&e.id, "lone fact", None).unwrap();
        let mut v = vec![0.0f32; crate::models::EMBEDDING_DIM];
        v[0] = 1.0;
        index.store(&e.id, &obs.id, &unit(v), "lone fact").unwrap();

        let clusters = svc.consolidate(None, 0.9).unwrap();
        assert!(clusters.is_empty());
    }

    #[test]
    fn transitively_joined_pair_below_threshold_is_included_in_average() {
        let store = Arc::new(Store::open_in_memory_for_tests().unwrap());
        let entities = Arc::new(EntityRepository::new(store.clone()));
        let observations = ObservationRepository::new(store.clone());
        let index = Arc::new(SemanticIndex::new(store));
        let svc = ConsolidationService::new(index.clone(), entities.clone());

        let e = entities.find_or_create("k", None).unwrap();

        let mut a = vec![0.0f32; crate::models::EMBEDDING_DIM];
        a[0] = 1.0;
        let a = unit(a);

        let mut b = vec![0.0f32; crate::models::EMBEDDING_DIM];
        b[0] = 0.9;
        b[1] = 0.1;
        let b = unit(b);

        let mut c = vec![0.0f32; crate::models::EMBEDDING_DIM];
        c[1] = 1.0;
        let c = unit(c);

        let oa = observations.create(&e.id, "a", None).unwrap();
        let ob = observations.create(&e.id, "b", None).unwrap();
        let oc = observations.create(&e.id, "c", None).unwrap();
        index.store(&e.id, &oa.id, &a, "a").unwrap();
        index.store(&e.id, &ob.id, &b, "b").unwrap();
        index.store(&e.id, &oc.id, &c, "c").unwrap();

        let sim_ab = cosine_similarity(&a, &b);
        let sim_bc = cosine_similarity(&b, &c);
        let sim_ac = cosine_similarity(&a, &c);
        assert!(sim_ab > 0.8 && sim_bc > 0.8, "test fixture must bridge a-b and b-c");
        assert!(sim_ac < 0.8, "a and c must not be directly similar");

        let clusters = svc.consolidate(Some(&e.id), 0.8).unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members.len(), 3);
        let expected_avg = ((sim_ab + sim_bc + sim_ac) / 3.0 * 1000.0).round() / 1000.0;
        assert!((clusters[0].avg_similarity - expected_avg).abs() < 1e-9);
    }

    #[test]
    fn clusters_sorted_by_size_descending() {
        let store = Arc::new(Store::open_in_memory_for_tests().unwrap());
        let entities = Arc::new(EntityRepository::new(store.clone()));
        let observations = ObservationRepository::new(store.clone());
        let index = Arc::new(SemanticIndex::new(store));
        let svc = ConsolidationService::new(index.clone(), entities.clone());

        let e = entities.find_or_create("k", None).unwrap();

        let mut pair_a = vec![0.0f32; crate::models::EMBEDDING_DIM];
        pair_a[0] = 1.0;
        let mut pair_b = vec![0.0f32; crate::models::EMBEDDING_DIM];
        pair_b[0] = 0.99;
        pair_b[1] = 0.01;

        let mut trio_a = vec![0.0f32; crate::models::EMBEDDING_DIM];
        trio_a[10] = 1.0;
        let mut trio_b = vec![0.0f32; crate::models::EMBEDDING_DIM];
        trio_b[10] = 0.99;
        trio_b[11] = 0.01;
        let mut trio_c = vec![0.0f32; crate::models::EMBEDDING_DIM];
        trio_c[10] = 0.98;
        trio_c[11] = 0.02;

        for (label, v) in [
            ("pair-a", pair_a),
            ("pair-b", pair_b),
            ("trio-a", trio_a),
            ("trio-b", trio_b),
            ("trio-c", trio_c),
        ] {
            let obs = observations.create(&e.id, label, None).unwrap();
            index.store(&e.id, &obs.id, &unit(v), label).unwrap();
        }

        let clusters = svc.consolidate(Some(&e.id), 0.95).unwrap();
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].members.len(), 3);
        assert_eq!(clusters[1].members.len(), 2);
    }
}
