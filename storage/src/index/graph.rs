use govsearch_core::model::{EdgeRecord, Relation};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Adjacency index over document ids, keeping both directions so edges
/// touching a document can be found without a full scan.
#[derive(Debug, Default)]
pub struct EdgeIndex {
    outgoing: HashMap<String, BTreeSet<(String, Relation)>>,
    incoming: HashMap<String, BTreeSet<(String, Relation)>>,
    edge_count: usize,
}

impl EdgeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the edge already existed.
    pub fn add_edge(&mut self, edge: &EdgeRecord) -> bool {
        let inserted = self
            .outgoing
            .entry(edge.src_id.clone())
            .or_default()
            .insert((edge.dst_id.clone(), edge.relation));
        if inserted {
            self.incoming
                .entry(edge.dst_id.clone())
                .or_default()
                .insert((edge.src_id.clone(), edge.relation));
            self.edge_count += 1;
        }
        inserted
    }

    /// Remove every edge with either endpoint in `ids`. Returns how many went.
    pub fn remove_touching(&mut self, ids: &HashSet<String>) -> usize {
        let mut doomed: BTreeSet<EdgeRecord> = BTreeSet::new();
        for id in ids {
            if let Some(targets) = self.outgoing.get(id) {
                for (dst, relation) in targets {
                    doomed.insert(EdgeRecord::new(id.clone(), dst.clone(), *relation));
                }
            }
            if let Some(sources) = self.incoming.get(id) {
                for (src, relation) in sources {
                    doomed.insert(EdgeRecord::new(src.clone(), id.clone(), *relation));
                }
            }
        }

        for edge in &doomed {
            self.remove_edge(edge);
        }
        doomed.len()
    }

    pub fn remove_edge(&mut self, edge: &EdgeRecord) -> bool {
        let removed = remove_entry(
            &mut self.outgoing,
            &edge.src_id,
            &(edge.dst_id.clone(), edge.relation),
        );
        if removed {
            remove_entry(
                &mut self.incoming,
                &edge.dst_id,
                &(edge.src_id.clone(), edge.relation),
            );
            self.edge_count -= 1;
        }
        removed
    }

    /// 1-hop outgoing neighbors.
    pub fn neighbors(&self, id: &str) -> Vec<(&str, Relation)> {
        self.outgoing
            .get(id)
            .map(|targets| {
                targets
                    .iter()
                    .map(|(dst, relation)| (dst.as_str(), *relation))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Outgoing neighbors up to two hops, with the hop at which each was first reached.
    pub fn neighbors_2hop(&self, id: &str) -> Vec<(String, u8)> {
        let mut result: BTreeMap<String, u8> = BTreeMap::new();

        for (target, _) in self.neighbors(id) {
            result.insert(target.to_string(), 1);
        }
        let first_hop: Vec<String> = result.keys().cloned().collect();
        for target in first_hop {
            for (target2, _) in self.neighbors(&target) {
                if target2 != id {
                    result.entry(target2.to_string()).or_insert(2);
                }
            }
        }

        result.into_iter().collect()
    }

    pub fn edges_for(&self, id: &str) -> Vec<EdgeRecord> {
        self.neighbors(id)
            .into_iter()
            .map(|(dst, relation)| EdgeRecord::new(id, dst, relation))
            .collect()
    }

    pub fn all_edges(&self) -> Vec<EdgeRecord> {
        let mut edges: Vec<EdgeRecord> = self
            .outgoing
            .iter()
            .flat_map(|(src, targets)| {
                targets
                    .iter()
                    .map(move |(dst, relation)| EdgeRecord::new(src.clone(), dst.clone(), *relation))
            })
            .collect();
        edges.sort();
        edges
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }
}

fn remove_entry(
    map: &mut HashMap<String, BTreeSet<(String, Relation)>>,
    key: &str,
    entry: &(String, Relation),
) -> bool {
    let Some(set) = map.get_mut(key) else {
        return false;
    };
    let removed = set.remove(entry);
    if set.is_empty() {
        map.remove(key);
    }
    removed
}
