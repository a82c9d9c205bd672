use crate::core::models::ids::AtomId;
use crate::core::models::system::MolecularSystem;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

/// An ordered, repeat-free cycle of atoms, stored in canonical form: the
/// minimum lexicographic rotation of the smaller of the sequence and its
/// reversal. Equal rings compare and hash equal regardless of the traversal
/// that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ring {
    atoms: Vec<AtomId>,
}

impl Ring {
    /// Canonicalizes an open or closed cycle sequence.
    pub fn new(mut atoms: Vec<AtomId>) -> Self {
        if atoms.len() > 1 && atoms.first() == atoms.last() {
            atoms.pop();
        }
        let forward = min_rotation(&atoms);
        let mut reversed = atoms;
        reversed.reverse();
        let backward = min_rotation(&reversed);
        Self {
            atoms: forward.min(backward),
        }
    }

    pub fn atoms(&self) -> &[AtomId] {
        &self.atoms
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn contains(&self, atom_id: AtomId) -> bool {
        self.atoms.contains(&atom_id)
    }

    /// Consecutive atom pairs, including the closing pair.
    pub fn edges(&self) -> impl Iterator<Item = (AtomId, AtomId)> + '_ {
        let n = self.atoms.len();
        (0..n).map(move |i| (self.atoms[i], self.atoms[(i + 1) % n]))
    }

    /// Sort key: (size, sorted atom tuple).
    fn sort_key(&self) -> (usize, Vec<AtomId>) {
        let mut sorted = self.atoms.clone();
        sorted.sort_unstable();
        (self.atoms.len(), sorted)
    }
}

fn min_rotation(seq: &[AtomId]) -> Vec<AtomId> {
    let n = seq.len();
    if n == 0 {
        return Vec::new();
    }
    let mut best: Option<Vec<AtomId>> = None;
    for start in 0..n {
        let rotation: Vec<AtomId> = (0..n).map(|i| seq[(start + i) % n]).collect();
        if best.as_ref().is_none_or(|b| rotation < *b) {
            best = Some(rotation);
        }
    }
    best.unwrap()
}

/// The filtered bond graph induced by an atom subset (every atom when the
/// subset is empty).
struct SubGraph {
    adjacency: HashMap<AtomId, Vec<AtomId>>,
    edges: Vec<(AtomId, AtomId)>,
    edge_index: HashMap<(AtomId, AtomId), usize>,
}

impl SubGraph {
    fn build(system: &MolecularSystem, atoms: &[AtomId]) -> Self {
        let subset: Option<HashSet<AtomId>> = if atoms.is_empty() {
            None
        } else {
            Some(atoms.iter().copied().collect())
        };
        let in_subset =
            |id: AtomId| subset.as_ref().map(|s| s.contains(&id)).unwrap_or(true);

        let mut adjacency: HashMap<AtomId, Vec<AtomId>> = HashMap::new();
        let mut edges = Vec::new();
        let mut edge_index = HashMap::new();
        for (id, _) in system.atoms_iter() {
            if in_subset(id) {
                adjacency.entry(id).or_default();
            }
        }
        for bond in system.bonds() {
            let (a, b) = (bond.atom1_id, bond.atom2_id);
            if bond.order < 1 || !in_subset(a) || !in_subset(b) {
                continue;
            }
            if system.atom(a).is_none_or(|at| at.is_pseudo())
                || system.atom(b).is_none_or(|at| at.is_pseudo())
            {
                continue;
            }
            edge_index.insert((a, b), edges.len());
            edges.push((a, b));
            adjacency.entry(a).or_default().push(b);
            adjacency.entry(b).or_default().push(a);
        }
        Self {
            adjacency,
            edges,
            edge_index,
        }
    }

    fn edge_id(&self, a: AtomId, b: AtomId) -> usize {
        let key = if a <= b { (a, b) } else { (b, a) };
        self.edge_index[&key]
    }

    /// Shortest path from `from` to `to` that does not use the (from, to)
    /// edge itself; `None` when the edge is a bridge.
    fn shortest_detour(&self, from: AtomId, to: AtomId) -> Option<Vec<AtomId>> {
        let mut prev: HashMap<AtomId, AtomId> = HashMap::new();
        let mut queue = VecDeque::new();
        queue.push_back(from);
        prev.insert(from, from);
        while let Some(current) = queue.pop_front() {
            if current == to {
                break;
            }
            for &next in &self.adjacency[&current] {
                if current == from && next == to {
                    continue;
                }
                if !prev.contains_key(&next) {
                    prev.insert(next, current);
                    queue.push_back(next);
                }
            }
        }
        if !prev.contains_key(&to) {
            return None;
        }
        let mut path = vec![to];
        let mut current = to;
        while current != from {
            current = prev[&current];
            path.push(current);
        }
        path.reverse();
        Some(path)
    }

    /// Connected components as (atom count, edge count) with member edges.
    fn components(&self) -> Vec<(usize, Vec<usize>)> {
        let mut seen: HashSet<AtomId> = HashSet::new();
        let mut components = Vec::new();
        let mut ordered: Vec<&AtomId> = self.adjacency.keys().collect();
        ordered.sort_unstable();
        for &&start in &ordered {
            if seen.contains(&start) {
                continue;
            }
            let mut members = HashSet::new();
            let mut queue = VecDeque::new();
            queue.push_back(start);
            members.insert(start);
            while let Some(current) = queue.pop_front() {
                for &next in &self.adjacency[&current] {
                    if members.insert(next) {
                        queue.push_back(next);
                    }
                }
            }
            let edges: Vec<usize> = self
                .edges
                .iter()
                .enumerate()
                .filter(|(_, (a, _))| members.contains(a))
                .map(|(i, _)| i)
                .collect();
            seen.extend(members.iter().copied());
            components.push((members.len(), edges));
        }
        components
    }
}

/// Bitset over edge indices with GF(2) arithmetic, used for ring
/// independence tests.
#[derive(Clone)]
struct EdgeVector(Vec<u64>);

impl EdgeVector {
    fn from_ring(ring: &Ring, graph: &SubGraph, words: usize) -> Self {
        let mut bits = vec![0u64; words];
        for (a, b) in ring.edges() {
            let e = graph.edge_id(a, b);
            bits[e / 64] |= 1 << (e % 64);
        }
        Self(bits)
    }

    fn leading_bit(&self) -> Option<usize> {
        for (w, &word) in self.0.iter().enumerate().rev() {
            if word != 0 {
                return Some(w * 64 + 63 - word.leading_zeros() as usize);
            }
        }
        None
    }

    fn xor_with(&mut self, other: &EdgeVector) {
        for (a, b) in self.0.iter_mut().zip(&other.0) {
            *a ^= b;
        }
    }
}

/// Echelonized GF(2) span of edge vectors.
#[derive(Default)]
struct EdgeSpan {
    rows: HashMap<usize, EdgeVector>,
}

impl EdgeSpan {
    /// Reduces `vector` against the span. Returns `true` (and absorbs the
    /// remainder) when the vector was independent.
    fn insert(&mut self, mut vector: EdgeVector) -> bool {
        while let Some(lead) = vector.leading_bit() {
            match self.rows.get(&lead) {
                Some(row) => {
                    let row = row.clone();
                    vector.xor_with(&row);
                }
                None => {
                    self.rows.insert(lead, vector);
                    return true;
                }
            }
        }
        false
    }

    fn contains(&self, vector: &EdgeVector) -> bool {
        let mut reduced = vector.clone();
        while let Some(lead) = reduced.leading_bit() {
            match self.rows.get(&lead) {
                Some(row) => reduced.xor_with(row),
                None => return false,
            }
        }
        true
    }
}

/// Perceives the smallest set of smallest rings of the filtered bond graph
/// induced by `atoms` (every atom when empty).
///
/// With `all_relevant` set, returns every minimum-sized ring that
/// participates in at least one SSSR basis (the union of all minimum cycle
/// bases) instead of one arbitrary basis; the result then may exceed the
/// cyclomatic count.
pub fn get_sssr(system: &MolecularSystem, atoms: &[AtomId], all_relevant: bool) -> Vec<Ring> {
    let graph = SubGraph::build(system, atoms);
    let words = graph.edges.len().div_ceil(64).max(1);

    // Candidates: for every edge, the smallest ring through it.
    let mut candidates: HashSet<Ring> = HashSet::new();
    for &(a, b) in &graph.edges {
        if let Some(path) = graph.shortest_detour(a, b) {
            candidates.insert(Ring::new(path));
        }
    }
    let mut candidates: Vec<Ring> = candidates.into_iter().collect();
    candidates.sort_by_cached_key(|ring| ring.sort_key());

    // Per-component cyclomatic counts bound the basis size.
    let rank_target: usize = graph
        .components()
        .iter()
        .map(|(n_atoms, edges)| (edges.len() + 1).saturating_sub(*n_atoms))
        .sum();
    debug!(
        candidates = candidates.len(),
        rank = rank_target,
        "ring perception"
    );

    let mut result = Vec::new();
    if all_relevant {
        // A ring is relevant iff it cannot be written as a sum of strictly
        // smaller rings (Vismara's criterion).
        let mut smaller = EdgeSpan::default();
        let mut pending: Vec<EdgeVector> = Vec::new();
        let mut current_size = 0;
        for ring in candidates {
            if ring.len() > current_size {
                for vector in pending.drain(..) {
                    smaller.insert(vector);
                }
                current_size = ring.len();
            }
            let vector = EdgeVector::from_ring(&ring, &graph, words);
            if !smaller.contains(&vector) {
                pending.push(vector);
                result.push(ring);
            }
        }
    } else {
        let mut basis = EdgeSpan::default();
        for ring in candidates {
            if result.len() == rank_target {
                break;
            }
            let vector = EdgeVector::from_ring(&ring, &graph, words);
            if basis.insert(vector) {
                result.push(ring);
            }
        }
    }
    result
}

/// Groups rings into ring systems: maximal sets of rings connected by shared
/// bonds. Returns ring indices, one list per system, ordered by the minimum
/// atom id within each system.
pub fn ring_systems(_system: &MolecularSystem, rings: &[Ring]) -> Vec<Vec<usize>> {
    let mut parent: Vec<usize> = (0..rings.len()).collect();

    fn find(parent: &mut Vec<usize>, mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    let mut edge_owner: HashMap<(AtomId, AtomId), usize> = HashMap::new();
    for (i, ring) in rings.iter().enumerate() {
        for (a, b) in ring.edges() {
            let key = if a <= b { (a, b) } else { (b, a) };
            match edge_owner.get(&key) {
                Some(&other) => {
                    let ra = find(&mut parent, i);
                    let rb = find(&mut parent, other);
                    if ra != rb {
                        parent[ra.max(rb)] = ra.min(rb);
                    }
                }
                None => {
                    edge_owner.insert(key, i);
                }
            }
        }
    }

    let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
    for i in 0..rings.len() {
        let root = find(&mut parent, i);
        groups.entry(root).or_default().push(i);
    }
    let mut systems: Vec<Vec<usize>> = groups.into_values().collect();
    for system in &mut systems {
        system.sort_unstable();
    }
    systems.sort_by_key(|members| {
        members
            .iter()
            .flat_map(|&i| rings[i].atoms().iter().copied())
            .min()
    });
    systems
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::atom::Atom;
    use crate::core::models::ids::ResidueId;

    fn new_residue(system: &mut MolecularSystem) -> ResidueId {
        let chain = system.add_chain("A");
        system.add_residue(chain, 1, "LIG").unwrap()
    }

    fn add_carbon(system: &mut MolecularSystem, residue: ResidueId, name: &str) -> AtomId {
        let mut atom = Atom::new(name, residue);
        atom.atomic_number = 6;
        system.add_atom(residue, atom).unwrap()
    }

    fn carbon_cycle(system: &mut MolecularSystem, residue: ResidueId, n: usize) -> Vec<AtomId> {
        let ids: Vec<AtomId> = (0..n)
            .map(|i| add_carbon(system, residue, &format!("C{}", i)))
            .collect();
        for i in 0..n {
            system.add_bond(ids[i], ids[(i + 1) % n], 1).unwrap();
        }
        ids
    }

    /// Two fused six-rings sharing the 0-1 bond.
    fn naphthalene_skeleton() -> (MolecularSystem, Vec<AtomId>) {
        let mut system = MolecularSystem::new();
        let residue = new_residue(&mut system);
        let ids: Vec<AtomId> = (0..10)
            .map(|i| add_carbon(&mut system, residue, &format!("C{}", i)))
            .collect();
        let bonds = [
            (0, 1),
            (1, 2),
            (2, 3),
            (3, 4),
            (4, 5),
            (5, 0),
            (1, 6),
            (6, 7),
            (7, 8),
            (8, 9),
            (9, 0),
        ];
        for (a, b) in bonds {
            system.add_bond(ids[a], ids[b], 1).unwrap();
        }
        (system, ids)
    }

    #[test]
    fn ring_canonical_form_ignores_rotation_and_direction() {
        let mut system = MolecularSystem::new();
        let residue = new_residue(&mut system);
        let ids = carbon_cycle(&mut system, residue, 5);

        let a = Ring::new(ids.clone());
        let rotated: Vec<AtomId> = (0..5).map(|i| ids[(i + 2) % 5]).collect();
        let mut reversed = ids.clone();
        reversed.reverse();
        let mut closed = ids.clone();
        closed.push(ids[0]);

        assert_eq!(a, Ring::new(rotated));
        assert_eq!(a, Ring::new(reversed));
        assert_eq!(a, Ring::new(closed));
    }

    #[test]
    fn sssr_count_matches_the_cycle_space_dimension() {
        let (system, _) = naphthalene_skeleton();
        // |E| - |V| + components = 11 - 10 + 1.
        let rings = get_sssr(&system, &[], false);
        assert_eq!(rings.len(), 2);
        assert!(rings.iter().all(|r| r.len() == 6));
    }

    #[test]
    fn sssr_rings_are_closed_bonded_cycles_without_repeats() {
        let (system, _) = naphthalene_skeleton();
        for ring in get_sssr(&system, &[], false) {
            let mut seen = HashSet::new();
            assert!(ring.atoms().iter().all(|&id| seen.insert(id)));
            for (a, b) in ring.edges() {
                assert!(system.bond(a, b).is_some(), "consecutive atoms not bonded");
            }
        }
    }

    #[test]
    fn sssr_ignores_acyclic_appendages_and_extra_components() {
        let mut system = MolecularSystem::new();
        let residue = new_residue(&mut system);
        let ring_ids = carbon_cycle(&mut system, residue, 6);
        let tail = add_carbon(&mut system, residue, "CT");
        system.add_bond(ring_ids[0], tail, 1).unwrap();
        let lone = add_carbon(&mut system, residue, "CL");
        let lone2 = add_carbon(&mut system, residue, "CM");
        system.add_bond(lone, lone2, 1).unwrap();

        let rings = get_sssr(&system, &[], false);
        assert_eq!(rings.len(), 1);
        assert_eq!(rings[0].len(), 6);
        assert!(!rings[0].contains(tail));
    }

    #[test]
    fn sssr_respects_the_atom_subset() {
        let (system, ids) = naphthalene_skeleton();
        let left_ring = [ids[0], ids[1], ids[2], ids[3], ids[4], ids[5]];
        let rings = get_sssr(&system, &left_ring, false);
        assert_eq!(rings.len(), 1);
        assert_eq!(rings[0].len(), 6);
    }

    #[test]
    fn all_relevant_matches_sssr_for_simple_fusions() {
        let (system, _) = naphthalene_skeleton();
        let rings = get_sssr(&system, &[], true);
        // The envelope 10-ring is a sum of the two 6-rings, so only the
        // 6-rings are relevant.
        assert_eq!(rings.len(), 2);
        assert!(rings.iter().all(|r| r.len() == 6));
    }

    #[test]
    fn fused_rings_share_a_system_spiro_rings_do_not() {
        let (fused, _) = naphthalene_skeleton();
        let rings = get_sssr(&fused, &[], true);
        assert_eq!(ring_systems(&fused, &rings), vec![vec![0, 1]]);

        // Two cyclopropanes joined at a single shared atom.
        let mut spiro = MolecularSystem::new();
        let residue = new_residue(&mut spiro);
        let hub = add_carbon(&mut spiro, residue, "C0");
        let a1 = add_carbon(&mut spiro, residue, "C1");
        let a2 = add_carbon(&mut spiro, residue, "C2");
        let b1 = add_carbon(&mut spiro, residue, "C3");
        let b2 = add_carbon(&mut spiro, residue, "C4");
        for (x, y) in [(hub, a1), (a1, a2), (a2, hub), (hub, b1), (b1, b2), (b2, hub)] {
            spiro.add_bond(x, y, 1).unwrap();
        }
        let rings = get_sssr(&spiro, &[], true);
        assert_eq!(rings.len(), 2);
        assert_eq!(ring_systems(&spiro, &rings).len(), 2);
    }
}
