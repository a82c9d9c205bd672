use super::atom::Atom;
use super::chain::Chain;
use super::ids::{AtomId, ChainId, ParamId, ParamTableId, ResidueId};
use super::residue::Residue;
use super::topology::{Bond, MAX_BOND_ORDER};
use crate::core::tables::{ColumnKind, ParamTable, TableError, Term, TermTable};
use slotmap::{SecondaryMap, SlotMap};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SystemError {
    #[error("unknown atom id")]
    UnknownAtom,
    #[error("unknown residue id")]
    UnknownResidue,
    #[error("unknown chain id")]
    UnknownChain,
    #[error("bond endpoints must be distinct atoms")]
    SelfBond,
    #[error("a bond between these atoms already exists")]
    DuplicateBond,
    #[error("no bond between these atoms")]
    UnknownBond,
    #[error("invalid bond order {0} (expected 0..={MAX_BOND_ORDER})")]
    InvalidBondOrder(u8),
    #[error("a term table named '{0}' already exists")]
    DuplicateTable(String),
    #[error("no term table named '{0}'")]
    UnknownTable(String),
    #[error("unknown parameter table id")]
    UnknownParamTable,
    #[error("parameter table is still referenced by a term or aux table")]
    TableInUse,
    #[error("parameter id {param} out of range for a table of {len} rows")]
    UnknownParam { param: ParamId, len: usize },
    #[error("term index {index} out of range for a table of {len} terms")]
    UnknownTerm { index: usize, len: usize },
    #[error("term arity mismatch for table '{table}': expected {expected}, got {got}")]
    WrongArity {
        table: String,
        expected: usize,
        got: usize,
    },
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Represents a complete molecular system: atoms, bonds, residues, chains,
/// and the parameter and term tables that describe its force-field terms.
///
/// Primary storage uses slot maps, so every handle returned to a caller is a
/// stable identifier that is never reused within the system's lifetime.
/// Connectivity is cached in an adjacency list, and fragment ids are
/// recomputed lazily after bond mutations.
#[derive(Debug, Clone, Default)]
pub struct MolecularSystem {
    atoms: SlotMap<AtomId, Atom>,
    residues: SlotMap<ResidueId, Residue>,
    chains: SlotMap<ChainId, Chain>,
    bonds: Vec<Bond>,
    /// Normalized (low, high) atom pair to index into `bonds`.
    bond_index: HashMap<(AtomId, AtomId), usize>,
    adjacency: SecondaryMap<AtomId, Vec<AtomId>>,
    /// Atom insertion order; drives deterministic iteration.
    atom_order: Vec<AtomId>,
    chain_order: Vec<ChainId>,
    param_tables: SlotMap<ParamTableId, ParamTable>,
    term_tables: BTreeMap<String, TermTable>,
    aux_tables: BTreeMap<String, ParamTableId>,
    fragids: Option<SecondaryMap<AtomId, usize>>,
}

impl MolecularSystem {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Atoms, residues, chains ---

    pub fn atom(&self, id: AtomId) -> Option<&Atom> {
        self.atoms.get(id)
    }

    pub fn atom_mut(&mut self, id: AtomId) -> Option<&mut Atom> {
        self.atoms.get_mut(id)
    }

    pub fn residue(&self, id: ResidueId) -> Option<&Residue> {
        self.residues.get(id)
    }

    pub fn residue_mut(&mut self, id: ResidueId) -> Option<&mut Residue> {
        self.residues.get_mut(id)
    }

    pub fn chain(&self, id: ChainId) -> Option<&Chain> {
        self.chains.get(id)
    }

    /// Atom ids in insertion order.
    pub fn atom_ids(&self) -> &[AtomId] {
        &self.atom_order
    }

    /// Iterates atoms in insertion order.
    pub fn atoms_iter(&self) -> impl Iterator<Item = (AtomId, &Atom)> {
        self.atom_order.iter().map(move |&id| (id, &self.atoms[id]))
    }

    pub fn chains_iter(&self) -> impl Iterator<Item = (ChainId, &Chain)> {
        self.chain_order
            .iter()
            .map(move |&id| (id, &self.chains[id]))
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    pub fn bond_count(&self) -> usize {
        self.bonds.len()
    }

    pub fn residue_count(&self) -> usize {
        self.residues.len()
    }

    pub fn chain_count(&self) -> usize {
        self.chains.len()
    }

    pub fn add_chain(&mut self, name: &str) -> ChainId {
        let id = self.chains.insert(Chain::new(name));
        self.chain_order.push(id);
        id
    }

    pub fn add_residue(
        &mut self,
        chain_id: ChainId,
        resid: i32,
        name: &str,
    ) -> Result<ResidueId, SystemError> {
        if !self.chains.contains_key(chain_id) {
            return Err(SystemError::UnknownChain);
        }
        let id = self.residues.insert(Residue::new(resid, name, chain_id));
        self.chains[chain_id].residues.push(id);
        Ok(id)
    }

    /// Inserts an atom into the given residue, returning its stable id.
    /// The atom's `residue_id` is set to `residue_id` regardless of its
    /// incoming value.
    pub fn add_atom(&mut self, residue_id: ResidueId, mut atom: Atom) -> Result<AtomId, SystemError> {
        if !self.residues.contains_key(residue_id) {
            return Err(SystemError::UnknownResidue);
        }
        atom.residue_id = residue_id;
        let id = self.atoms.insert(atom);
        self.adjacency.insert(id, Vec::new());
        self.atom_order.push(id);
        self.residues[residue_id].add_atom(id);
        Ok(id)
    }

    /// Removes an atom, cascading to incident bonds and to every term whose
    /// tuple references it.
    pub fn remove_atom(&mut self, atom_id: AtomId) -> Result<Atom, SystemError> {
        let atom = self.atoms.remove(atom_id).ok_or(SystemError::UnknownAtom)?;

        if let Some(residue) = self.residues.get_mut(atom.residue_id) {
            residue.remove_atom(atom_id);
        }
        self.atom_order.retain(|&id| id != atom_id);

        let neighbors = self.adjacency.remove(atom_id).unwrap_or_default();
        if !neighbors.is_empty() {
            self.bonds.retain(|bond| !bond.contains(atom_id));
            self.rebuild_bond_index();
            for neighbor in neighbors {
                if let Some(adj) = self.adjacency.get_mut(neighbor) {
                    adj.retain(|&id| id != atom_id);
                }
            }
        }

        for table in self.term_tables.values_mut() {
            table.retain_terms(|term| !term.atoms.contains(&atom_id));
        }

        self.fragids = None;
        Ok(atom)
    }

    /// Removes a residue and all of its atoms.
    pub fn remove_residue(&mut self, residue_id: ResidueId) -> Result<Residue, SystemError> {
        if !self.residues.contains_key(residue_id) {
            return Err(SystemError::UnknownResidue);
        }
        for atom_id in self.residues[residue_id].atoms().to_vec() {
            self.remove_atom(atom_id)?;
        }
        let residue = self.residues.remove(residue_id).unwrap();
        if let Some(chain) = self.chains.get_mut(residue.chain_id) {
            chain.residues.retain(|&id| id != residue_id);
        }
        Ok(residue)
    }

    // --- Bonds ---

    pub fn add_bond(&mut self, a: AtomId, b: AtomId, order: u8) -> Result<(), SystemError> {
        if !self.atoms.contains_key(a) || !self.atoms.contains_key(b) {
            return Err(SystemError::UnknownAtom);
        }
        if a == b {
            return Err(SystemError::SelfBond);
        }
        if order > MAX_BOND_ORDER {
            return Err(SystemError::InvalidBondOrder(order));
        }
        let bond = Bond::new(a, b, order);
        if self.bond_index.contains_key(&bond.key()) {
            return Err(SystemError::DuplicateBond);
        }
        self.bond_index.insert(bond.key(), self.bonds.len());
        self.bonds.push(bond);
        self.adjacency[a].push(b);
        self.adjacency[b].push(a);
        self.fragids = None;
        Ok(())
    }

    pub fn remove_bond(&mut self, a: AtomId, b: AtomId) -> Result<Bond, SystemError> {
        let key = Bond::new(a, b, 0).key();
        let index = *self
            .bond_index
            .get(&key)
            .ok_or(SystemError::UnknownBond)?;
        let bond = self.bonds.remove(index);
        self.rebuild_bond_index();
        self.adjacency[bond.atom1_id].retain(|&id| id != bond.atom2_id);
        self.adjacency[bond.atom2_id].retain(|&id| id != bond.atom1_id);
        self.fragids = None;
        Ok(bond)
    }

    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    pub fn bond(&self, a: AtomId, b: AtomId) -> Option<&Bond> {
        let key = Bond::new(a, b, 0).key();
        self.bond_index.get(&key).map(|&i| &self.bonds[i])
    }

    pub fn bond_mut(&mut self, a: AtomId, b: AtomId) -> Option<&mut Bond> {
        let key = Bond::new(a, b, 0).key();
        let index = *self.bond_index.get(&key)?;
        Some(&mut self.bonds[index])
    }

    pub fn set_bond_order(&mut self, a: AtomId, b: AtomId, order: u8) -> Result<(), SystemError> {
        if order > MAX_BOND_ORDER {
            return Err(SystemError::InvalidBondOrder(order));
        }
        let bond = self.bond_mut(a, b).ok_or(SystemError::UnknownBond)?;
        let was_placeholder = bond.order == 0;
        bond.order = order;
        bond.resonant_order = order as f64;
        // Toggling a bond in or out of the placeholder state changes the
        // filtered connectivity.
        if was_placeholder != (order == 0) {
            self.fragids = None;
        }
        Ok(())
    }

    /// Bonded neighbors (unfiltered), in bond insertion order.
    pub fn neighbors(&self, atom_id: AtomId) -> Option<&[AtomId]> {
        self.adjacency.get(atom_id).map(|v| v.as_slice())
    }

    /// Bonds incident on an atom, excluding order-0 placeholders and
    /// pseudo-bonds (bonds with a pseudo-particle endpoint).
    pub fn filtered_bonds_for_atom(&self, atom_id: AtomId) -> Vec<&Bond> {
        let Some(neighbors) = self.adjacency.get(atom_id) else {
            return Vec::new();
        };
        neighbors
            .iter()
            .filter_map(|&other| self.bond(atom_id, other))
            .filter(|bond| {
                bond.order >= 1
                    && !self.atoms[bond.atom1_id].is_pseudo()
                    && !self.atoms[bond.atom2_id].is_pseudo()
            })
            .collect()
    }

    /// Neighbors connected through filtered bonds.
    pub fn filtered_neighbors(&self, atom_id: AtomId) -> Vec<AtomId> {
        self.filtered_bonds_for_atom(atom_id)
            .iter()
            .filter_map(|bond| bond.partner(atom_id))
            .collect()
    }

    fn rebuild_bond_index(&mut self) {
        self.bond_index = self
            .bonds
            .iter()
            .enumerate()
            .map(|(i, bond)| (bond.key(), i))
            .collect();
    }

    // --- Fragments ---

    /// Recomputes fragment ids with a union-find over the filtered bond
    /// graph and returns the fragments as atom-id lists. Two atoms share a
    /// fragid iff a path of order-1-or-higher, non-pseudo bonds connects
    /// them. Fragids are dense and numbered by first appearance in atom
    /// insertion order.
    pub fn update_fragids(&mut self) -> Vec<Vec<AtomId>> {
        let index_of: HashMap<AtomId, usize> = self
            .atom_order
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, i))
            .collect();
        let mut parent: Vec<usize> = (0..self.atom_order.len()).collect();

        fn find(parent: &mut Vec<usize>, mut i: usize) -> usize {
            while parent[i] != i {
                parent[i] = parent[parent[i]];
                i = parent[i];
            }
            i
        }

        for bond in &self.bonds {
            if bond.order < 1
                || self.atoms[bond.atom1_id].is_pseudo()
                || self.atoms[bond.atom2_id].is_pseudo()
            {
                continue;
            }
            let a = find(&mut parent, index_of[&bond.atom1_id]);
            let b = find(&mut parent, index_of[&bond.atom2_id]);
            if a != b {
                parent[b.max(a)] = b.min(a);
            }
        }

        let mut fragids = SecondaryMap::new();
        let mut root_to_frag: HashMap<usize, usize> = HashMap::new();
        let mut fragments: Vec<Vec<AtomId>> = Vec::new();
        for (i, &atom_id) in self.atom_order.iter().enumerate() {
            let root = find(&mut parent, i);
            let frag = *root_to_frag.entry(root).or_insert_with(|| {
                fragments.push(Vec::new());
                fragments.len() - 1
            });
            fragids.insert(atom_id, frag);
            fragments[frag].push(atom_id);
        }
        self.fragids = Some(fragids);
        fragments
    }

    /// Cached fragment id, or `None` when the cache has been invalidated by
    /// a bond mutation since the last [`update_fragids`](Self::update_fragids).
    pub fn fragid(&self, atom_id: AtomId) -> Option<usize> {
        self.fragids.as_ref()?.get(atom_id).copied()
    }

    // --- Parameter and term tables ---

    pub fn add_param_table(&mut self, table: ParamTable) -> ParamTableId {
        self.param_tables.insert(table)
    }

    pub fn param_table(&self, id: ParamTableId) -> Option<&ParamTable> {
        self.param_tables.get(id)
    }

    pub fn param_table_mut(&mut self, id: ParamTableId) -> Option<&mut ParamTable> {
        self.param_tables.get_mut(id)
    }

    /// Removes a parameter table. Rejected while any term or aux table still
    /// references it.
    pub fn remove_param_table(&mut self, id: ParamTableId) -> Result<ParamTable, SystemError> {
        if !self.param_tables.contains_key(id) {
            return Err(SystemError::UnknownParamTable);
        }
        let referenced = self.term_tables.values().any(|t| t.param_table() == id)
            || self.aux_tables.values().any(|&aux| aux == id);
        if referenced {
            return Err(SystemError::TableInUse);
        }
        Ok(self.param_tables.remove(id).unwrap())
    }

    /// Creates a term table of the given arity with a fresh parameter table
    /// built from `columns`, returning the parameter table id.
    pub fn add_table(
        &mut self,
        name: &str,
        arity: usize,
        columns: &[(&str, ColumnKind)],
    ) -> Result<ParamTableId, SystemError> {
        let params = self.add_param_table(ParamTable::with_columns(columns));
        self.add_term_table(name, arity, params)?;
        Ok(params)
    }

    pub fn add_term_table(
        &mut self,
        name: &str,
        arity: usize,
        param_table: ParamTableId,
    ) -> Result<(), SystemError> {
        if self.term_tables.contains_key(name) {
            return Err(SystemError::DuplicateTable(name.to_string()));
        }
        if !self.param_tables.contains_key(param_table) {
            return Err(SystemError::UnknownParamTable);
        }
        self.term_tables
            .insert(name.to_string(), TermTable::new(name, arity, param_table));
        Ok(())
    }

    pub fn term_table(&self, name: &str) -> Option<&TermTable> {
        self.term_tables.get(name)
    }

    pub fn term_tables(&self) -> impl Iterator<Item = &TermTable> {
        self.term_tables.values()
    }

    pub fn remove_term_table(&mut self, name: &str) -> Result<TermTable, SystemError> {
        self.term_tables
            .remove(name)
            .ok_or_else(|| SystemError::UnknownTable(name.to_string()))
    }

    /// Appends a term after validating arity, atom liveness, and the
    /// parameter reference.
    pub fn add_term(
        &mut self,
        table: &str,
        atoms: &[AtomId],
        param: Option<ParamId>,
    ) -> Result<(), SystemError> {
        let term_table = self
            .term_tables
            .get(table)
            .ok_or_else(|| SystemError::UnknownTable(table.to_string()))?;
        if atoms.len() != term_table.arity() {
            return Err(SystemError::WrongArity {
                table: table.to_string(),
                expected: term_table.arity(),
                got: atoms.len(),
            });
        }
        if atoms.iter().any(|&id| !self.atoms.contains_key(id)) {
            return Err(SystemError::UnknownAtom);
        }
        if let Some(param) = param {
            let len = self.param_tables[term_table.param_table()].param_count();
            if param >= len {
                return Err(SystemError::UnknownParam { param, len });
            }
        }
        self.term_tables.get_mut(table).unwrap().push_term(Term {
            atoms: atoms.to_vec(),
            param,
        });
        Ok(())
    }

    /// Updates the parameter reference of one term.
    pub fn set_term_param(
        &mut self,
        table: &str,
        term_index: usize,
        param: Option<ParamId>,
    ) -> Result<(), SystemError> {
        let term_table = self
            .term_tables
            .get(table)
            .ok_or_else(|| SystemError::UnknownTable(table.to_string()))?;
        if term_index >= term_table.term_count() {
            return Err(SystemError::UnknownTerm {
                index: term_index,
                len: term_table.term_count(),
            });
        }
        if let Some(param) = param {
            let len = self.param_tables[term_table.param_table()].param_count();
            if param >= len {
                return Err(SystemError::UnknownParam { param, len });
            }
        }
        self.term_tables
            .get_mut(table)
            .unwrap()
            .set_term_param(term_index, param);
        Ok(())
    }

    /// Registers a standalone named parameter table (for example a CMAP
    /// correction grid), replacing any previous table of the same name.
    pub fn add_aux_table(&mut self, name: &str, table: ParamTable) -> ParamTableId {
        let id = self.add_param_table(table);
        if let Some(old) = self.aux_tables.insert(name.to_string(), id) {
            self.param_tables.remove(old);
        }
        id
    }

    pub fn aux_table(&self, name: &str) -> Option<&ParamTable> {
        self.param_tables.get(*self.aux_tables.get(name)?)
    }

    pub fn aux_table_names(&self) -> impl Iterator<Item = &str> {
        self.aux_tables.keys().map(|s| s.as_str())
    }

    /// Gives the named term table a private copy of its parameter table if
    /// it currently shares one with another consumer. Returns the parameter
    /// table id the term table references afterwards.
    pub fn detach_param_table(&mut self, table: &str) -> Result<ParamTableId, SystemError> {
        let term_table = self
            .term_tables
            .get(table)
            .ok_or_else(|| SystemError::UnknownTable(table.to_string()))?;
        let shared_id = term_table.param_table();
        let shared = self
            .term_tables
            .values()
            .filter(|t| t.param_table() == shared_id)
            .count()
            > 1
            || self.aux_tables.values().any(|&aux| aux == shared_id);
        if !shared {
            return Ok(shared_id);
        }
        let copy = self.param_tables[shared_id].clone();
        let new_id = self.param_tables.insert(copy);
        self.term_tables
            .get_mut(table)
            .unwrap()
            .set_param_table(new_id);
        Ok(new_id)
    }

    /// Coalesces duplicate parameter rows in every table referenced by a
    /// term table, remapping term parameter references. Idempotent.
    pub fn coalesce_tables(&mut self) {
        let ids: Vec<ParamTableId> = {
            let mut seen = Vec::new();
            for table in self.term_tables.values() {
                let id = table.param_table();
                if !seen.contains(&id) {
                    seen.push(id);
                }
            }
            seen
        };
        for id in ids {
            if let Some(remap) = self.param_tables[id].coalesce() {
                for table in self.term_tables.values_mut() {
                    if table.param_table() == id {
                        table.remap_params(&remap);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tables::{ColumnKind, Value};

    fn empty_residue(system: &mut MolecularSystem) -> ResidueId {
        let chain = system.add_chain("A");
        system.add_residue(chain, 1, "UNK").unwrap()
    }

    fn add_plain_atom(system: &mut MolecularSystem, residue: ResidueId, name: &str, z: u8) -> AtomId {
        let mut atom = Atom::new(name, residue);
        atom.atomic_number = z;
        system.add_atom(residue, atom).unwrap()
    }

    #[test]
    fn atoms_belong_to_their_residue_and_iterate_in_order() {
        let mut system = MolecularSystem::new();
        let residue = empty_residue(&mut system);
        let c = add_plain_atom(&mut system, residue, "C", 6);
        let o = add_plain_atom(&mut system, residue, "O", 8);

        assert_eq!(system.residue(residue).unwrap().atoms(), &[c, o]);
        let names: Vec<&str> = system.atoms_iter().map(|(_, a)| a.name.as_str()).collect();
        assert_eq!(names, ["C", "O"]);
    }

    #[test]
    fn duplicate_and_self_bonds_are_rejected() {
        let mut system = MolecularSystem::new();
        let residue = empty_residue(&mut system);
        let a = add_plain_atom(&mut system, residue, "C1", 6);
        let b = add_plain_atom(&mut system, residue, "C2", 6);

        system.add_bond(a, b, 1).unwrap();
        assert_eq!(system.add_bond(b, a, 1), Err(SystemError::DuplicateBond));
        assert_eq!(system.add_bond(a, a, 1), Err(SystemError::SelfBond));
        assert_eq!(system.bond_count(), 1);
    }

    #[test]
    fn removing_an_atom_cascades_to_bonds_and_terms() {
        let mut system = MolecularSystem::new();
        let residue = empty_residue(&mut system);
        let a = add_plain_atom(&mut system, residue, "C1", 6);
        let b = add_plain_atom(&mut system, residue, "C2", 6);
        let c = add_plain_atom(&mut system, residue, "C3", 6);
        system.add_bond(a, b, 1).unwrap();
        system.add_bond(b, c, 1).unwrap();

        system
            .add_table("stretch_harm", 2, &[("fc", ColumnKind::Float)])
            .unwrap();
        system.add_term("stretch_harm", &[a, b], None).unwrap();
        system.add_term("stretch_harm", &[b, c], None).unwrap();

        system.remove_atom(b).unwrap();

        assert_eq!(system.bond_count(), 0);
        assert_eq!(system.term_table("stretch_harm").unwrap().term_count(), 0);
        assert_eq!(system.neighbors(a).unwrap(), &[] as &[AtomId]);
        assert!(system.atom(b).is_none());
    }

    #[test]
    fn filtered_bonds_exclude_placeholders_and_pseudo_particles() {
        let mut system = MolecularSystem::new();
        let residue = empty_residue(&mut system);
        let c = add_plain_atom(&mut system, residue, "C", 6);
        let o = add_plain_atom(&mut system, residue, "O", 8);
        let virt = add_plain_atom(&mut system, residue, "EP", 0);
        let n = add_plain_atom(&mut system, residue, "N", 7);

        system.add_bond(c, o, 1).unwrap();
        system.add_bond(c, virt, 1).unwrap();
        system.add_bond(c, n, 0).unwrap();

        let filtered = system.filtered_bonds_for_atom(c);
        assert_eq!(filtered.len(), 1);
        assert!(filtered[0].contains(o));
        assert_eq!(system.filtered_neighbors(c), vec![o]);
    }

    #[test]
    fn fragids_track_bond_connectivity() {
        let mut system = MolecularSystem::new();
        let residue = empty_residue(&mut system);
        let a = add_plain_atom(&mut system, residue, "A", 6);
        let b = add_plain_atom(&mut system, residue, "B", 6);
        let c = add_plain_atom(&mut system, residue, "C", 6);
        system.add_bond(a, b, 1).unwrap();

        let fragments = system.update_fragids();
        assert_eq!(fragments, vec![vec![a, b], vec![c]]);
        assert_eq!(system.fragid(a), Some(0));
        assert_eq!(system.fragid(c), Some(1));

        // Bond mutation invalidates the cache until the next recompute.
        system.add_bond(b, c, 1).unwrap();
        assert_eq!(system.fragid(c), None);
        system.update_fragids();
        assert_eq!(system.fragid(c), Some(0));
    }

    #[test]
    fn term_arity_and_liveness_are_validated() {
        let mut system = MolecularSystem::new();
        let residue = empty_residue(&mut system);
        let a = add_plain_atom(&mut system, residue, "A", 6);
        let b = add_plain_atom(&mut system, residue, "B", 6);
        system
            .add_table("angle_harm", 3, &[("fc", ColumnKind::Float)])
            .unwrap();

        let err = system.add_term("angle_harm", &[a, b], None).unwrap_err();
        assert_eq!(
            err,
            SystemError::WrongArity {
                table: "angle_harm".to_string(),
                expected: 3,
                got: 2,
            }
        );

        let removed = b;
        system.remove_atom(removed).unwrap();
        let err = system
            .add_term("angle_harm", &[a, removed, a], None)
            .unwrap_err();
        assert_eq!(err, SystemError::UnknownAtom);
    }

    #[test]
    fn param_table_deletion_is_rejected_while_referenced() {
        let mut system = MolecularSystem::new();
        let params = system
            .add_table("exclusion", 2, &[("dummy", ColumnKind::Int)])
            .unwrap();
        assert_eq!(
            system.remove_param_table(params),
            Err(SystemError::TableInUse)
        );
        system.remove_term_table("exclusion").unwrap();
        assert!(system.remove_param_table(params).is_ok());
    }

    #[test]
    fn detach_gives_a_private_copy_only_when_shared() {
        let mut system = MolecularSystem::new();
        let shared = system.add_param_table(ParamTable::with_columns(&[("fc", ColumnKind::Float)]));
        system.add_term_table("first", 2, shared).unwrap();
        system.add_term_table("second", 2, shared).unwrap();

        let detached = system.detach_param_table("second").unwrap();
        assert_ne!(detached, shared);
        assert_eq!(system.term_table("first").unwrap().param_table(), shared);

        // No longer shared: detach is now a no-op.
        assert_eq!(system.detach_param_table("second").unwrap(), detached);
    }

    #[test]
    fn coalesce_remaps_term_params() {
        let mut system = MolecularSystem::new();
        let residue = empty_residue(&mut system);
        let a = add_plain_atom(&mut system, residue, "A", 6);
        let b = add_plain_atom(&mut system, residue, "B", 6);
        let params = system
            .add_table("stretch_harm", 2, &[("fc", ColumnKind::Float)])
            .unwrap();
        let table = system.param_table_mut(params).unwrap();
        for fc in [1.0, 1.0, 2.0] {
            let p = table.add_param();
            table.set_value_by_name(p, "fc", Value::Float(fc)).unwrap();
        }
        system.add_term("stretch_harm", &[a, b], Some(1)).unwrap();
        system.add_term("stretch_harm", &[b, a], Some(2)).unwrap();

        system.coalesce_tables();

        let table = system.param_table(params).unwrap();
        assert_eq!(table.param_count(), 2);
        let terms = system.term_table("stretch_harm").unwrap().terms();
        assert_eq!(terms[0].param, Some(0));
        assert_eq!(terms[1].param, Some(1));
    }
}
