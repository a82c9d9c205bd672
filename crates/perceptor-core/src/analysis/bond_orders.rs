use crate::core::models::element::{max_total_order, valence_patterns, Element};
use crate::core::models::ids::AtomId;
use crate::core::models::system::MolecularSystem;
use bitflags::bitflags;
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;
use tracing::{debug, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

bitflags! {
    #[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
    pub struct AssignFlags: u32 {
        /// Average bond orders and formal charges over all optimal
        /// assignments within each fragment.
        const COMPUTE_RESONANT_CHARGES = 0b0000_0001;
    }
}

/// Optimal-solution enumeration stops here; averaging then uses the
/// enumerated prefix.
const MAX_RESONANCE_SOLUTIONS: usize = 256;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssignError {
    #[error(
        "no bond order and formal charge assignment satisfies the constraints on fragment {fragment}"
    )]
    Infeasible { fragment: usize },
    #[error("total charge {total} cannot be distributed over the selected fragments")]
    ChargeUnsatisfiable { total: i32 },
}

/// One admissible electron bookkeeping state for an atom at a known total
/// bond order.
#[derive(Debug, Clone, Copy)]
struct ChargeOption {
    charge: i32,
    cost: u32,
}

/// Penalty for placing a given charge on a given element. Base penalties
/// come from the element's valence-pattern table; electronegativity breaks
/// ties so that negative charge prefers the more electronegative atom.
fn option_cost(atomic_number: u8, charge: i32, penalty: u32) -> u32 {
    let eneg = Element::from_atomic_number(atomic_number)
        .map(|e| e.eneg())
        .unwrap_or(0.0);
    let adjustment = if charge < 0 {
        (45.0 - 10.0 * eneg).max(0.0)
    } else if charge > 0 {
        10.0 * eneg
    } else {
        0.0
    };
    penalty * 100 + adjustment.round() as u32
}

fn charge_options(atomic_number: u8, total_order: i64) -> Vec<ChargeOption> {
    let patterns = valence_patterns(atomic_number);
    if patterns.is_empty() {
        // Free atom: any coordination, charge 0.
        return vec![ChargeOption { charge: 0, cost: 0 }];
    }
    patterns
        .iter()
        .filter(|p| p.total_order as i64 == total_order)
        .map(|p| ChargeOption {
            charge: p.charge,
            cost: option_cost(atomic_number, p.charge, p.penalty),
        })
        .collect()
}

/// A complete integer assignment for one fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Solution {
    orders: Vec<u8>,
    charges: Vec<i32>,
}

/// The connected-fragment subproblem: atoms, variable bonds, and the fixed
/// order contributed by bonds leaving the selection.
struct Fragment {
    atom_ids: Vec<AtomId>,
    atomic_numbers: Vec<u8>,
    /// Order sum from filtered bonds to atoms outside the selection.
    fixed: Vec<i64>,
    /// Variable bonds as (atom index, atom index), endpoints in-fragment.
    bonds: Vec<(usize, usize)>,
    bond_ids: Vec<(AtomId, AtomId)>,
}

impl Fragment {
    fn cap(&self, atom: usize) -> i64 {
        max_total_order(self.atomic_numbers[atom]) as i64
    }

    fn min_needed(&self, atom: usize) -> i64 {
        let patterns = valence_patterns(self.atomic_numbers[atom]);
        patterns
            .iter()
            .map(|p| p.total_order as i64)
            .min()
            .unwrap_or(0)
    }
}

/// Per-fragment solve result: for every achievable fragment net charge, the
/// minimal cost and the optimal solutions found (capped).
struct FragmentResult {
    by_charge: HashMap<i32, (u32, Vec<Solution>)>,
}

impl FragmentResult {
    /// The cheapest charge; ties prefer the smaller magnitude, then the
    /// smaller signed value, keeping the choice deterministic.
    fn best_charge(&self) -> Option<i32> {
        self.by_charge
            .iter()
            .min_by_key(|(&q, &(cost, _))| (cost, q.abs(), q))
            .map(|(&q, _)| q)
    }
}

struct Solver<'a> {
    fragment: &'a Fragment,
    /// Bond domains after constraint propagation.
    domains: Vec<Vec<u8>>,
    /// DFS assignment order over bond indices.
    order: Vec<usize>,
    enumerate_all: bool,
    /// Branch-and-bound ceiling; only used when a single cheapest solution
    /// with a free net charge is wanted.
    prune_by_cost: bool,
    best_cost: u32,
    result: FragmentResult,
    truncated: bool,
}

impl<'a> Solver<'a> {
    fn solve(
        fragment: &'a Fragment,
        enumerate_all: bool,
        prune_by_cost: bool,
    ) -> Option<FragmentResult> {
        let domains = propagate_domains(fragment)?;
        let mut order: Vec<usize> = (0..fragment.bonds.len()).collect();
        order.sort_by_key(|&b| (domains[b].len(), b));
        let mut solver = Solver {
            fragment,
            domains,
            order,
            enumerate_all,
            prune_by_cost,
            best_cost: u32::MAX,
            result: FragmentResult {
                by_charge: HashMap::new(),
            },
            truncated: false,
        };

        let n_atoms = solver.fragment.atom_ids.len();
        let mut sums: Vec<i64> = solver.fragment.fixed.clone();
        let mut remaining: Vec<i64> = vec![0; n_atoms];
        for &(u, v) in &solver.fragment.bonds {
            remaining[u] += 1;
            remaining[v] += 1;
        }
        let mut orders = vec![0u8; solver.fragment.bonds.len()];
        solver.descend(0, 0, &mut sums, &mut remaining, &mut orders);
        if solver.truncated {
            warn!(
                limit = MAX_RESONANCE_SOLUTIONS,
                "resonance enumeration truncated; averaging over the enumerated prefix"
            );
        }
        if solver.result.by_charge.is_empty() {
            None
        } else {
            Some(solver.result)
        }
    }

    fn descend(
        &mut self,
        depth: usize,
        partial_cost: u32,
        sums: &mut Vec<i64>,
        remaining: &mut Vec<i64>,
        orders: &mut Vec<u8>,
    ) {
        if depth == self.order.len() {
            self.record_leaf(sums, orders);
            return;
        }
        let bond = self.order[depth];
        let (u, v) = self.fragment.bonds[bond];
        let domain = self.domains[bond].clone();
        remaining[u] -= 1;
        remaining[v] -= 1;
        for order in domain {
            let order_i64 = order as i64;
            sums[u] += order_i64;
            sums[v] += order_i64;
            let feasible = [u, v].iter().all(|&x| {
                sums[x] + remaining[x] <= self.fragment.cap(x)
                    && sums[x] + 3 * remaining[x] >= self.fragment.min_needed(x)
            });
            // An atom whose last bond was just assigned must land on an
            // admissible valence state; its cheapest option is an admissible
            // lower bound for the branch.
            let mut branch_cost = partial_cost;
            let mut complete_ok = true;
            if feasible {
                for &x in &[u, v] {
                    if remaining[x] != 0 {
                        continue;
                    }
                    let options = charge_options(self.fragment.atomic_numbers[x], sums[x]);
                    match options.iter().map(|o| o.cost).min() {
                        Some(cost) => branch_cost = branch_cost.saturating_add(cost),
                        None => {
                            complete_ok = false;
                            break;
                        }
                    }
                }
            }
            let pruned = self.prune_by_cost && branch_cost > self.best_cost;
            if feasible && complete_ok && !pruned {
                orders[bond] = order;
                self.descend(depth + 1, branch_cost, sums, remaining, orders);
            }
            sums[u] -= order_i64;
            sums[v] -= order_i64;
        }
        remaining[u] += 1;
        remaining[v] += 1;
    }

    /// All bonds assigned: fold the per-atom charge options into the
    /// per-charge result map.
    fn record_leaf(&mut self, sums: &[i64], orders: &[u8]) {
        let options: Vec<Vec<ChargeOption>> = self
            .fragment
            .atomic_numbers
            .iter()
            .zip(sums)
            .map(|(&z, &total)| charge_options(z, total))
            .collect();
        if options.iter().any(|o| o.is_empty()) {
            return;
        }

        // Suffix DP: minimal cost per achievable charge for atoms i..n.
        let n = options.len();
        let mut suffix: Vec<HashMap<i32, u32>> = vec![HashMap::new(); n + 1];
        suffix[n].insert(0, 0);
        for i in (0..n).rev() {
            let mut map = HashMap::new();
            for option in &options[i] {
                for (&charge, &cost) in &suffix[i + 1] {
                    let entry = map
                        .entry(charge + option.charge)
                        .or_insert(u32::MAX);
                    *entry = (*entry).min(cost.saturating_add(option.cost));
                }
            }
            suffix[i] = map;
        }

        let totals: Vec<(i32, u32)> = suffix[0].iter().map(|(&q, &c)| (q, c)).collect();
        if self.prune_by_cost {
            if let Some(&min_cost) = suffix[0].values().min() {
                self.best_cost = self.best_cost.min(min_cost);
            }
        }
        for (fragment_charge, leaf_cost) in totals {
            let entry = self
                .result
                .by_charge
                .entry(fragment_charge)
                .or_insert((u32::MAX, Vec::new()));
            if leaf_cost > entry.0 {
                continue;
            }
            if leaf_cost < entry.0 {
                entry.0 = leaf_cost;
                entry.1.clear();
            }
            let budget = if self.enumerate_all {
                MAX_RESONANCE_SOLUTIONS.saturating_sub(entry.1.len())
            } else if entry.1.is_empty() {
                1
            } else {
                0
            };
            if budget == 0 {
                if self.enumerate_all {
                    self.truncated = true;
                }
                continue;
            }
            let mut vectors = Vec::new();
            enumerate_optimal_charges(
                &options,
                &suffix,
                fragment_charge,
                leaf_cost,
                budget,
                &mut Vec::new(),
                &mut vectors,
            );
            let entry = self.result.by_charge.get_mut(&fragment_charge).unwrap();
            for charges in vectors {
                entry.1.push(Solution {
                    orders: orders.to_vec(),
                    charges,
                });
            }
        }
    }
}

/// Walks only the charge assignments whose suffix costs stay on the optimal
/// path for the given target charge.
fn enumerate_optimal_charges(
    options: &[Vec<ChargeOption>],
    suffix: &[HashMap<i32, u32>],
    target: i32,
    budget_cost: u32,
    budget_count: usize,
    prefix: &mut Vec<i32>,
    out: &mut Vec<Vec<i32>>,
) {
    if out.len() >= budget_count {
        return;
    }
    let i = prefix.len();
    if i == options.len() {
        if target == 0 && budget_cost == 0 {
            out.push(prefix.clone());
        }
        return;
    }
    for option in &options[i] {
        if option.cost > budget_cost {
            continue;
        }
        let rest_target = target - option.charge;
        let rest_cost = budget_cost - option.cost;
        if suffix[i + 1].get(&rest_target) == Some(&rest_cost) {
            prefix.push(option.charge);
            enumerate_optimal_charges(
                options,
                suffix,
                rest_target,
                rest_cost,
                budget_count,
                prefix,
                out,
            );
            prefix.pop();
        }
    }
}

/// Arc-consistency pass over the bond domains {1, 2, 3}: the order of each
/// bond is bounded by what its endpoints can still absorb. Returns `None`
/// when a domain empties.
fn propagate_domains(fragment: &Fragment) -> Option<Vec<Vec<u8>>> {
    let n_atoms = fragment.atom_ids.len();
    let mut incident: Vec<Vec<usize>> = vec![Vec::new(); n_atoms];
    for (b, &(u, v)) in fragment.bonds.iter().enumerate() {
        incident[u].push(b);
        incident[v].push(b);
    }
    let mut domains: Vec<Vec<u8>> = vec![vec![1, 2, 3]; fragment.bonds.len()];

    let mut changed = true;
    while changed {
        changed = false;
        for atom in 0..n_atoms {
            let cap = fragment.cap(atom) - fragment.fixed[atom];
            let min_needed = fragment.min_needed(atom) - fragment.fixed[atom];
            let min_sum: i64 = incident[atom]
                .iter()
                .map(|&b| domains[b].first().copied().unwrap_or(0) as i64)
                .sum();
            let max_sum: i64 = incident[atom]
                .iter()
                .map(|&b| domains[b].last().copied().unwrap_or(0) as i64)
                .sum();
            for &b in &incident[atom] {
                let own_min = *domains[b].first()? as i64;
                let own_max = *domains[b].last()? as i64;
                let allowed_max = cap - (min_sum - own_min);
                let allowed_min = min_needed - (max_sum - own_max);
                let before = domains[b].len();
                domains[b].retain(|&o| {
                    let o = o as i64;
                    o <= allowed_max && o >= allowed_min
                });
                if domains[b].len() != before {
                    changed = true;
                }
                if domains[b].is_empty() {
                    return None;
                }
            }
        }
    }
    Some(domains)
}

/// Partitions the selection into connected fragments over filtered bonds.
fn build_fragments(system: &MolecularSystem, selection: &[AtomId]) -> Vec<Fragment> {
    let in_selection: HashSet<AtomId> = selection.iter().copied().collect();
    let mut visited: HashSet<AtomId> = HashSet::new();
    let mut fragments = Vec::new();

    for &start in selection {
        if visited.contains(&start) {
            continue;
        }
        let mut members = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back(start);
        visited.insert(start);
        while let Some(current) = queue.pop_front() {
            members.push(current);
            for neighbor in system.filtered_neighbors(current) {
                if in_selection.contains(&neighbor) && visited.insert(neighbor) {
                    queue.push_back(neighbor);
                }
            }
        }

        let index: HashMap<AtomId, usize> =
            members.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        let mut fixed = vec![0i64; members.len()];
        let mut bonds = Vec::new();
        let mut bond_ids = Vec::new();
        for (i, &id) in members.iter().enumerate() {
            for bond in system.filtered_bonds_for_atom(id) {
                let other = bond.partner(id).unwrap();
                match index.get(&other) {
                    Some(&j) => {
                        if i < j {
                            bonds.push((i, j));
                            bond_ids.push((id, other));
                        }
                    }
                    None => fixed[i] += bond.order as i64,
                }
            }
        }
        fragments.push(Fragment {
            atomic_numbers: members
                .iter()
                .map(|&id| system.atom(id).unwrap().atomic_number)
                .collect(),
            atom_ids: members,
            fixed,
            bonds,
            bond_ids,
        });
    }
    fragments
}

/// Assigns integer bond orders in {1, 2, 3} and formal charges over the
/// selected atoms (every non-pseudo atom when `atoms` is empty).
///
/// The problem is solved independently per connected fragment by a complete
/// branch-and-bound over bond orders with per-atom valence constraints; the
/// objective penalizes non-zero formal charges and non-preferred valences.
/// When `total_charge` is given, the formal charges sum to it exactly.
///
/// On failure nothing in the system is modified. With
/// [`AssignFlags::COMPUTE_RESONANT_CHARGES`], bond `resonant_order` and atom
/// `resonant_charge` receive the arithmetic mean over all optimal solutions
/// of each fragment.
pub fn assign_bond_orders_and_formal_charges(
    system: &mut MolecularSystem,
    atoms: &[AtomId],
    total_charge: Option<i32>,
    flags: AssignFlags,
) -> Result<(), AssignError> {
    let selection: Vec<AtomId> = if atoms.is_empty() {
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
    if selection.is_empty() {
        return Ok(());
    }

    let fragments = build_fragments(system, &selection);
    let enumerate_all = flags.contains(AssignFlags::COMPUTE_RESONANT_CHARGES);
    debug!(
        fragments = fragments.len(),
        atoms = selection.len(),
        "bond order assignment"
    );

    // With a free net charge and no averaging, only the single cheapest
    // solution matters and the search can prune on cost.
    let prune_by_cost = !enumerate_all && total_charge.is_none();

    #[cfg(feature = "parallel")]
    let solved: Vec<Option<FragmentResult>> = fragments
        .par_iter()
        .map(|fragment| Solver::solve(fragment, enumerate_all, prune_by_cost))
        .collect();
    #[cfg(not(feature = "parallel"))]
    let solved: Vec<Option<FragmentResult>> = fragments
        .iter()
        .map(|fragment| Solver::solve(fragment, enumerate_all, prune_by_cost))
        .collect();

    let mut results = Vec::with_capacity(fragments.len());
    for (i, result) in solved.into_iter().enumerate() {
        match result {
            Some(result) => results.push(result),
            None => return Err(AssignError::Infeasible { fragment: i }),
        }
    }

    // Pick a net charge per fragment: freely at minimum cost, or via a
    // cross-fragment assignment that meets the requested total.
    let chosen: Vec<i32> = match total_charge {
        None => results
            .iter()
            .enumerate()
            .map(|(i, r)| {
                r.best_charge()
                    .ok_or(AssignError::Infeasible { fragment: i })
            })
            .collect::<Result<_, _>>()?,
        Some(target) => {
            let mut dp: HashMap<i32, (u32, Vec<i32>)> = HashMap::new();
            dp.insert(0, (0, Vec::new()));
            for result in &results {
                let mut next: HashMap<i32, (u32, Vec<i32>)> = HashMap::new();
                for (&sum, &(cost, ref path)) in &dp {
                    for (&q, &(frag_cost, _)) in &result.by_charge {
                        let total_cost = cost.saturating_add(frag_cost);
                        let entry = next.entry(sum + q).or_insert((u32::MAX, Vec::new()));
                        if total_cost < entry.0 {
                            let mut new_path = path.clone();
                            new_path.push(q);
                            *entry = (total_cost, new_path);
                        }
                    }
                }
                dp = next;
            }
            match dp.remove(&target) {
                Some((_, path)) => path,
                None if results.len() == 1 => {
                    return Err(AssignError::Infeasible { fragment: 0 });
                }
                None => return Err(AssignError::ChargeUnsatisfiable { total: target }),
            }
        }
    };

    // All fragments solved: commit. Nothing above has touched the system.
    for ((fragment, result), charge) in fragments.iter().zip(&results).zip(chosen) {
        let (_, solutions) = &result.by_charge[&charge];
        let best = &solutions[0];

        for (b, &(u, v)) in fragment.bond_ids.iter().enumerate() {
            system
                .set_bond_order(u, v, best.orders[b])
                .expect("fragment bond disappeared during assignment");
        }
        for (i, &id) in fragment.atom_ids.iter().enumerate() {
            let atom = system.atom_mut(id).unwrap();
            atom.formal_charge = best.charges[i];
            atom.resonant_charge = best.charges[i] as f64;
        }

        if enumerate_all && solutions.len() > 1 {
            let count = solutions.len() as f64;
            for (b, &(u, v)) in fragment.bond_ids.iter().enumerate() {
                let mean = solutions.iter().map(|s| s.orders[b] as f64).sum::<f64>() / count;
                system.bond_mut(u, v).unwrap().resonant_order = mean;
            }
            for (i, &id) in fragment.atom_ids.iter().enumerate() {
                let mean = solutions.iter().map(|s| s.charges[i] as f64).sum::<f64>() / count;
                system.atom_mut(id).unwrap().resonant_charge = mean;
            }
        }
    }
    Ok(())
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

    fn add_atom(system: &mut MolecularSystem, residue: ResidueId, z: u8) -> AtomId {
        let mut atom = Atom::new("X", residue);
        atom.atomic_number = z;
        system.add_atom(residue, atom).unwrap()
    }

    fn with_hydrogens(
        system: &mut MolecularSystem,
        residue: ResidueId,
        heavy: AtomId,
        count: usize,
    ) -> Vec<AtomId> {
        (0..count)
            .map(|_| {
                let h = add_atom(system, residue, 1);
                system.add_bond(heavy, h, 1).unwrap();
                h
            })
            .collect()
    }

    fn benzene() -> (MolecularSystem, Vec<AtomId>) {
        let mut system = MolecularSystem::new();
        let residue = new_residue(&mut system);
        let carbons: Vec<AtomId> = (0..6).map(|_| add_atom(&mut system, residue, 6)).collect();
        for i in 0..6 {
            system.add_bond(carbons[i], carbons[(i + 1) % 6], 1).unwrap();
        }
        for &c in &carbons {
            with_hydrogens(&mut system, residue, c, 1);
        }
        (system, carbons)
    }

    fn total_formal_charge(system: &MolecularSystem) -> i32 {
        system.atoms_iter().map(|(_, a)| a.formal_charge).sum()
    }

    #[test]
    fn benzene_gets_an_alternating_kekule_assignment() {
        let (mut system, carbons) = benzene();
        assign_bond_orders_and_formal_charges(&mut system, &[], None, AssignFlags::empty())
            .unwrap();

        let ring_orders: Vec<u8> = (0..6)
            .map(|i| system.bond(carbons[i], carbons[(i + 1) % 6]).unwrap().order)
            .collect();
        assert_eq!(ring_orders.iter().filter(|&&o| o == 2).count(), 3);
        for i in 0..6 {
            // No two adjacent double bonds.
            assert!(ring_orders[i] != 2 || ring_orders[(i + 1) % 6] != 2);
        }
        assert_eq!(total_formal_charge(&system), 0);
    }

    #[test]
    fn benzene_resonant_orders_average_to_three_halves() {
        let (mut system, carbons) = benzene();
        assign_bond_orders_and_formal_charges(
            &mut system,
            &[],
            None,
            AssignFlags::COMPUTE_RESONANT_CHARGES,
        )
        .unwrap();

        for i in 0..6 {
            let bond = system.bond(carbons[i], carbons[(i + 1) % 6]).unwrap();
            assert!(
                (bond.resonant_order - 1.5).abs() < 1e-12,
                "ring bond resonant order {}",
                bond.resonant_order
            );
        }
        // C-H bonds do not resonate.
        for &c in &carbons {
            for neighbor in system.filtered_neighbors(c) {
                if system.atom(neighbor).unwrap().atomic_number == 1 {
                    let bond = system.bond(c, neighbor).unwrap();
                    assert_eq!(bond.order, 1);
                    assert!((bond.resonant_order - 1.0).abs() < 1e-12);
                }
            }
        }
        assert_eq!(total_formal_charge(&system), 0);
    }

    #[test]
    fn carbonyl_and_nitrile_get_multiple_bonds() {
        // Formaldehyde: H2C=O.
        let mut system = MolecularSystem::new();
        let residue = new_residue(&mut system);
        let c = add_atom(&mut system, residue, 6);
        let o = add_atom(&mut system, residue, 8);
        system.add_bond(c, o, 1).unwrap();
        with_hydrogens(&mut system, residue, c, 2);
        assign_bond_orders_and_formal_charges(&mut system, &[], None, AssignFlags::empty())
            .unwrap();
        assert_eq!(system.bond(c, o).unwrap().order, 2);
        assert_eq!(total_formal_charge(&system), 0);

        // Hydrogen cyanide: HC#N.
        let mut system = MolecularSystem::new();
        let residue = new_residue(&mut system);
        let c = add_atom(&mut system, residue, 6);
        let n = add_atom(&mut system, residue, 7);
        system.add_bond(c, n, 1).unwrap();
        with_hydrogens(&mut system, residue, c, 1);
        assign_bond_orders_and_formal_charges(&mut system, &[], None, AssignFlags::empty())
            .unwrap();
        assert_eq!(system.bond(c, n).unwrap().order, 3);
        assert_eq!(total_formal_charge(&system), 0);
    }

    #[test]
    fn requested_total_charge_is_honored_exactly() {
        // Acetate-like fragment: CH3-CO2 with total charge -1.
        let mut system = MolecularSystem::new();
        let residue = new_residue(&mut system);
        let c1 = add_atom(&mut system, residue, 6);
        let c2 = add_atom(&mut system, residue, 6);
        let o1 = add_atom(&mut system, residue, 8);
        let o2 = add_atom(&mut system, residue, 8);
        system.add_bond(c1, c2, 1).unwrap();
        system.add_bond(c2, o1, 1).unwrap();
        system.add_bond(c2, o2, 1).unwrap();
        with_hydrogens(&mut system, residue, c1, 3);

        assign_bond_orders_and_formal_charges(&mut system, &[], Some(-1), AssignFlags::empty())
            .unwrap();
        assert_eq!(total_formal_charge(&system), -1);
        // One C=O, one C-O(-).
        let orders = [
            system.bond(c2, o1).unwrap().order,
            system.bond(c2, o2).unwrap().order,
        ];
        assert_eq!(orders.iter().filter(|&&o| o == 2).count(), 1);
    }

    #[test]
    fn carboxylate_resonance_averages_the_two_oxygens() {
        let mut system = MolecularSystem::new();
        let residue = new_residue(&mut system);
        let c1 = add_atom(&mut system, residue, 6);
        let c2 = add_atom(&mut system, residue, 6);
        let o1 = add_atom(&mut system, residue, 8);
        let o2 = add_atom(&mut system, residue, 8);
        system.add_bond(c1, c2, 1).unwrap();
        system.add_bond(c2, o1, 1).unwrap();
        system.add_bond(c2, o2, 1).unwrap();
        with_hydrogens(&mut system, residue, c1, 3);

        assign_bond_orders_and_formal_charges(
            &mut system,
            &[],
            Some(-1),
            AssignFlags::COMPUTE_RESONANT_CHARGES,
        )
        .unwrap();
        for &o in &[o1, o2] {
            let bond = system.bond(c2, o).unwrap();
            assert!((bond.resonant_order - 1.5).abs() < 1e-12);
            let atom = system.atom(o).unwrap();
            assert!((atom.resonant_charge + 0.5).abs() < 1e-12);
        }
    }

    #[test]
    fn methane_with_a_forced_positive_charge_is_infeasible() {
        let mut system = MolecularSystem::new();
        let residue = new_residue(&mut system);
        let c = add_atom(&mut system, residue, 6);
        with_hydrogens(&mut system, residue, c, 4);

        let before: Vec<u8> = system.bonds().iter().map(|b| b.order).collect();
        let err = assign_bond_orders_and_formal_charges(
            &mut system,
            &[],
            Some(1),
            AssignFlags::empty(),
        )
        .unwrap_err();
        assert_eq!(err, AssignError::Infeasible { fragment: 0 });

        // The fragment is untouched on failure.
        let after: Vec<u8> = system.bonds().iter().map(|b| b.order).collect();
        assert_eq!(before, after);
        assert_eq!(total_formal_charge(&system), 0);
    }

    #[test]
    fn free_atoms_and_halide_ions_resolve_without_bonds() {
        let mut system = MolecularSystem::new();
        let residue = new_residue(&mut system);
        let sodium = add_atom(&mut system, residue, 11);
        let chloride = add_atom(&mut system, residue, 17);

        assign_bond_orders_and_formal_charges(&mut system, &[], Some(-1), AssignFlags::empty())
            .unwrap();
        assert_eq!(system.atom(sodium).unwrap().formal_charge, 0);
        assert_eq!(system.atom(chloride).unwrap().formal_charge, -1);
    }

    #[test]
    fn selection_subset_leaves_external_bonds_alone() {
        // Ethene; assign only one carbon's side.
        let mut system = MolecularSystem::new();
        let residue = new_residue(&mut system);
        let c1 = add_atom(&mut system, residue, 6);
        let c2 = add_atom(&mut system, residue, 6);
        system.add_bond(c1, c2, 2).unwrap();
        let h1 = with_hydrogens(&mut system, residue, c1, 2);
        with_hydrogens(&mut system, residue, c2, 2);

        let mut selection = vec![c1];
        selection.extend(h1);
        assign_bond_orders_and_formal_charges(
            &mut system,
            &selection,
            None,
            AssignFlags::empty(),
        )
        .unwrap();
        // The external C=C keeps its fixed order and balances c1's valence.
        assert_eq!(system.bond(c1, c2).unwrap().order, 2);
        assert_eq!(system.atom(c1).unwrap().formal_charge, 0);
    }
}
