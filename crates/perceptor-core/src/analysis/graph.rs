use crate::core::models::ids::AtomId;
use crate::core::models::system::MolecularSystem;
use itertools::Itertools;
use slotmap::SecondaryMap;
use std::collections::HashMap;

/// 64-bit FNV-1a. Hashing must be stable across processes so that graph
/// digests and topological ids can be compared between runs; the standard
/// library hasher does not guarantee that.
#[derive(Clone, Copy)]
struct Fnv1a(u64);

impl Fnv1a {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    fn new(seed: u64) -> Self {
        Self(Self::OFFSET ^ seed)
    }

    fn write_u64(&mut self, value: u64) {
        for byte in value.to_le_bytes() {
            self.0 ^= byte as u64;
            self.0 = self.0.wrapping_mul(Self::PRIME);
        }
    }

    fn write_i64(&mut self, value: i64) {
        self.write_u64(value as u64);
    }

    fn finish(self) -> u64 {
        self.0
    }
}

/// Per-atom attributes that must agree between matched atoms.
#[derive(Clone, Copy, PartialEq, Eq)]
struct AtomKey {
    atomic_number: u8,
    formal_charge: i32,
    aromatic: bool,
}

/// An immutable snapshot of the induced subgraph over a set of atoms, with
/// Morgan-refined invariants. The snapshot only sees filtered bonds between
/// non-pseudo member atoms.
pub struct Graph<'a> {
    system: &'a MolecularSystem,
    atoms: Vec<AtomId>,
    keys: Vec<AtomKey>,
    /// Neighbor index plus bond order, sorted by neighbor index.
    adjacency: Vec<Vec<(usize, u8)>>,
    invariants: Vec<u64>,
}

impl<'a> Graph<'a> {
    /// Builds the graph over `atoms`, or over every atom when `atoms` is
    /// empty. Pseudo particles are always excluded.
    pub fn new(system: &'a MolecularSystem, atoms: &[AtomId]) -> Self {
        let member_ids: Vec<AtomId> = if atoms.is_empty() {
            system
                .atoms_iter()
                .filter(|(_, atom)| !atom.is_pseudo())
                .map(|(id, _)| id)
                .collect()
        } else {
            atoms
                .iter()
                .copied()
                .filter(|&id| system.atom(id).map(|a| !a.is_pseudo()).unwrap_or(false))
                .collect()
        };
        let index: HashMap<AtomId, usize> = member_ids
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, i))
            .collect();

        let mut adjacency = vec![Vec::new(); member_ids.len()];
        for (i, &id) in member_ids.iter().enumerate() {
            for bond in system.filtered_bonds_for_atom(id) {
                let other = bond.partner(id).unwrap();
                if let Some(&j) = index.get(&other) {
                    adjacency[i].push((j, bond.order));
                }
            }
            adjacency[i].sort_unstable();
        }

        let keys: Vec<AtomKey> = member_ids
            .iter()
            .map(|&id| {
                let atom = system.atom(id).unwrap();
                AtomKey {
                    atomic_number: atom.atomic_number,
                    formal_charge: atom.formal_charge,
                    aromatic: atom.is_aromatic(),
                }
            })
            .collect();

        let invariants = refine_invariants(&keys, &adjacency);
        Self {
            system,
            atoms: member_ids,
            keys,
            adjacency,
            invariants,
        }
    }

    pub fn system(&self) -> &MolecularSystem {
        self.system
    }

    pub fn atoms(&self) -> &[AtomId] {
        &self.atoms
    }

    pub fn size(&self) -> usize {
        self.atoms.len()
    }

    fn edge_count(&self) -> usize {
        self.adjacency.iter().map(|n| n.len()).sum::<usize>() / 2
    }

    /// Canonical digest of the graph: invariant under any renumbering of the
    /// atoms that preserves structure and attributes.
    pub fn hash(&self) -> String {
        let mut atom_signatures: Vec<(u64, u8, i32, bool, usize)> = (0..self.size())
            .map(|i| {
                (
                    self.invariants[i],
                    self.keys[i].atomic_number,
                    self.keys[i].formal_charge,
                    self.keys[i].aromatic,
                    self.adjacency[i].len(),
                )
            })
            .collect();
        atom_signatures.sort_unstable();

        let mut edge_signatures: Vec<(u64, u64, u8)> = Vec::with_capacity(self.edge_count());
        for i in 0..self.size() {
            for &(j, order) in &self.adjacency[i] {
                if i < j {
                    let (a, b) = (
                        self.invariants[i].min(self.invariants[j]),
                        self.invariants[i].max(self.invariants[j]),
                    );
                    edge_signatures.push((a, b, order));
                }
            }
        }
        edge_signatures.sort_unstable();

        let mut digest = [Fnv1a::new(0), Fnv1a::new(u64::MAX)];
        for half in &mut digest {
            half.write_u64(self.size() as u64);
            for &(inv, z, charge, aromatic, degree) in &atom_signatures {
                half.write_u64(inv);
                half.write_u64(z as u64);
                half.write_i64(charge as i64);
                half.write_u64(aromatic as u64);
                half.write_u64(degree as u64);
            }
            for &(a, b, order) in &edge_signatures {
                half.write_u64(a);
                half.write_u64(b);
                half.write_u64(order as u64);
            }
        }
        format!("{:016x}{:016x}", digest[0].finish(), digest[1].finish())
    }

    /// First exact isomorphism onto `other`, as (self atom, other atom)
    /// pairs, or `None` when the graphs do not match.
    pub fn matches(&self, other: &Graph) -> Option<Vec<(AtomId, AtomId)>> {
        let mut results = Vec::new();
        self.search(other, false, true, &mut results);
        results.into_iter().next()
    }

    /// Every isomorphism onto `other`. With `substructure` set, `self` may
    /// be a strict subgraph of `other` (extra atoms and bonds in `other` are
    /// allowed).
    pub fn matches_all(&self, other: &Graph, substructure: bool) -> Vec<Vec<(AtomId, AtomId)>> {
        let mut results = Vec::new();
        self.search(other, substructure, false, &mut results);
        results
    }

    fn compatible(&self, other: &Graph, p: usize, t: usize, substructure: bool) -> bool {
        if self.keys[p] != other.keys[t] {
            return false;
        }
        if substructure {
            self.adjacency[p].len() <= other.adjacency[t].len()
        } else {
            self.adjacency[p].len() == other.adjacency[t].len()
                && self.invariants[p] == other.invariants[t]
        }
    }

    fn search(
        &self,
        other: &Graph,
        substructure: bool,
        first_only: bool,
        results: &mut Vec<Vec<(AtomId, AtomId)>>,
    ) {
        if substructure {
            if self.size() > other.size() {
                return;
            }
        } else if self.size() != other.size() || self.edge_count() != other.edge_count() {
            return;
        }
        if self.size() == 0 {
            results.push(Vec::new());
            return;
        }

        // Visit pattern atoms connectivity-first so that every step after
        // the first in a component is adjacency-constrained.
        let order = self.search_order();
        let mut mapping: Vec<Option<usize>> = vec![None; self.size()];
        let mut used: Vec<bool> = vec![false; other.size()];
        self.extend(
            other,
            substructure,
            first_only,
            &order,
            0,
            &mut mapping,
            &mut used,
            results,
        );
    }

    fn search_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.size());
        let mut placed = vec![false; self.size()];
        while order.len() < self.size() {
            // Prefer atoms adjacent to already-ordered ones, then high
            // degree.
            let next = (0..self.size())
                .filter(|&i| !placed[i])
                .max_by_key(|&i| {
                    let attached = self.adjacency[i]
                        .iter()
                        .filter(|&&(j, _)| placed[j])
                        .count();
                    (attached, self.adjacency[i].len())
                })
                .unwrap();
            placed[next] = true;
            order.push(next);
        }
        order
    }

    #[allow(clippy::too_many_arguments)]
    fn extend(
        &self,
        other: &Graph,
        substructure: bool,
        first_only: bool,
        order: &[usize],
        depth: usize,
        mapping: &mut Vec<Option<usize>>,
        used: &mut Vec<bool>,
        results: &mut Vec<Vec<(AtomId, AtomId)>>,
    ) -> bool {
        if depth == order.len() {
            results.push(
                (0..self.size())
                    .map(|p| (self.atoms[p], other.atoms[mapping[p].unwrap()]))
                    .collect(),
            );
            return first_only;
        }
        let p = order[depth];

        // Candidates: images of mapped neighbors constrain the choice.
        let candidates: Vec<usize> = match self.adjacency[p]
            .iter()
            .find(|&&(q, _)| mapping[q].is_some())
        {
            Some(&(q, _)) => other.adjacency[mapping[q].unwrap()]
                .iter()
                .map(|&(t, _)| t)
                .collect(),
            None => (0..other.size()).collect(),
        };

        for t in candidates {
            if used[t] || !self.compatible(other, p, t, substructure) {
                continue;
            }
            // Every mapped pattern neighbor must be a bonded image with the
            // same bond order.
            let consistent = self.adjacency[p].iter().all(|&(q, porder)| {
                match mapping[q] {
                    Some(tq) => other.adjacency[t]
                        .iter()
                        .any(|&(tn, torder)| tn == tq && torder == porder),
                    None => true,
                }
            });
            if !consistent {
                continue;
            }
            mapping[p] = Some(t);
            used[t] = true;
            let stop = self.extend(
                other,
                substructure,
                first_only,
                order,
                depth + 1,
                mapping,
                used,
                results,
            );
            mapping[p] = None;
            used[t] = false;
            if stop {
                return true;
            }
        }
        false
    }
}

fn initial_invariant(key: &AtomKey, degree: usize) -> u64 {
    let mut hasher = Fnv1a::new(0);
    hasher.write_u64(key.atomic_number as u64);
    hasher.write_i64(key.formal_charge as i64);
    hasher.write_u64(degree as u64);
    hasher.write_u64(key.aromatic as u64);
    hasher.finish()
}

/// Morgan refinement: each round folds the sorted multiset of neighbor
/// invariants into each atom's own. Stops when the partition stops refining
/// or after |V| rounds.
fn refine_invariants(keys: &[AtomKey], adjacency: &[Vec<(usize, u8)>]) -> Vec<u64> {
    let n = keys.len();
    let mut invariants: Vec<u64> = (0..n)
        .map(|i| initial_invariant(&keys[i], adjacency[i].len()))
        .collect();
    let mut classes = distinct_count(&invariants);

    for _ in 0..n {
        let next: Vec<u64> = (0..n)
            .map(|i| {
                let mut neighbor_invs: Vec<(u64, u8)> = adjacency[i]
                    .iter()
                    .map(|&(j, order)| (invariants[j], order))
                    .collect();
                neighbor_invs.sort_unstable();
                let mut hasher = Fnv1a::new(1);
                hasher.write_u64(invariants[i]);
                for (inv, order) in neighbor_invs {
                    hasher.write_u64(inv);
                    hasher.write_u64(order as u64);
                }
                hasher.finish()
            })
            .collect();
        let next_classes = distinct_count(&next);
        if next_classes == classes {
            break;
        }
        invariants = next;
        classes = next_classes;
    }
    invariants
}

fn distinct_count(values: &[u64]) -> usize {
    values.iter().unique().count()
}

/// Stable per-atom topological ids: dense ranks of the refined invariants.
/// Automorphic atoms share a rank.
pub fn compute_topological_ids(system: &MolecularSystem) -> SecondaryMap<AtomId, u64> {
    let graph = Graph::new(system, &[]);
    let mut sorted: Vec<u64> = graph.invariants.clone();
    sorted.sort_unstable();
    sorted.dedup();
    let mut ids = SecondaryMap::new();
    for (i, &atom_id) in graph.atoms.iter().enumerate() {
        let rank = sorted.binary_search(&graph.invariants[i]).unwrap() as u64;
        ids.insert(atom_id, rank);
    }
    ids
}

/// Canonical digest of the induced subgraph (every atom when `atoms` is
/// empty); see [`Graph::hash`].
pub fn graph_hash(system: &MolecularSystem, atoms: &[AtomId]) -> String {
    Graph::new(system, atoms).hash()
}

/// Groups connected fragments by canonical graph hash and returns one
/// representative fragid per distinct fragment topology, in first-occurrence
/// order.
pub fn find_distinct_fragments(system: &mut MolecularSystem) -> Vec<usize> {
    let fragments = system.update_fragids();
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut distinct = Vec::new();
    for (fragid, members) in fragments.iter().enumerate() {
        let hash = graph_hash(system, members);
        if !seen.contains_key(&hash) {
            seen.insert(hash, fragid);
            distinct.push(fragid);
        }
    }
    distinct
}
