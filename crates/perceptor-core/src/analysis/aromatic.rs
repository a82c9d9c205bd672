use super::rings::{get_sssr, Ring};
use crate::core::models::atom::AtomFlags;
use crate::core::models::ids::AtomId;
use crate::core::models::system::MolecularSystem;
use itertools::Itertools;
use nalgebra::Matrix3;

/// Per-atom contribution to a ring's pi system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RingAtomClass {
    /// Contributes a lone pair (vsum == 1).
    X,
    /// Contributes one electron through an in-ring double bond (bsum == 1).
    Y,
    /// Contributes one electron through an exocyclic C=C bond (ebsum == 1).
    YExt,
    /// Contributes no pi electrons.
    Z,
    /// Cannot be part of an aromatic ring.
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingAromaticity {
    Aromatic,
    AntiAromatic,
    NonAromatic,
}

/// Classifies one ring atom from its electron bookkeeping: `nb` filtered
/// neighbors, `a0` unshared electron pairs, `b0`/`b1` in-ring bond orders,
/// and `be` the order of an exocyclic carbon-carbon bond (0 when absent).
pub fn classify_ring_atom(nb: usize, a0: i64, b0: i64, b1: i64, be: i64) -> RingAtomClass {
    if nb >= 4 {
        // Excludes some thiazole and isothiazole dioxide compounds.
        return RingAtomClass::Invalid;
    }
    let vsum = a0 - (3 - nb as i64);
    let bsum = b0 + b1 - 2;
    let ebsum = (be - 1).max(0);
    if !(0..=1).contains(&vsum)
        || !(0..=1).contains(&bsum)
        || ebsum > 1
        || (vsum == 1 && bsum == 1)
    {
        return RingAtomClass::Invalid;
    }
    if vsum == 1 {
        RingAtomClass::X
    } else if bsum == 1 {
        RingAtomClass::Y
    } else if ebsum == 1 {
        RingAtomClass::YExt
    } else {
        RingAtomClass::Z
    }
}

/// Ring verdict from the class counts: Hueckel's rule on the number of
/// electron pairs, `count = nX + (nY + nYe)/2`.
pub fn classify_ring_counts(nx: usize, ny: usize, nye: usize) -> RingAromaticity {
    // Unpaired external electrons cannot delocalize.
    if nye % 2 == 1 {
        return RingAromaticity::NonAromatic;
    }
    // In-ring double bonds contribute electrons pairwise.
    if ny % 2 == 1 {
        return RingAromaticity::NonAromatic;
    }
    let count = nx + (ny + nye) / 2;
    if count == 0 || (count - 1) % 2 == 1 {
        RingAromaticity::AntiAromatic
    } else {
        RingAromaticity::Aromatic
    }
}

/// Classifies the class of every atom of a ring, or `None` when the ring is
/// not a closed bonded cycle of at least three atoms.
pub fn classify_ring_atoms(
    system: &MolecularSystem,
    ring: &Ring,
) -> Option<Vec<RingAtomClass>> {
    let atoms = ring.atoms();
    let n = atoms.len();
    if n < 3 {
        return None;
    }
    let mut classes = Vec::with_capacity(n);
    for (index, &current) in atoms.iter().enumerate() {
        let previous = atoms[(index + n - 1) % n];
        let next = atoms[(index + 1) % n];
        let atom = system.atom(current)?;
        let element = atom.element()?;

        let bonds = system.filtered_bonds_for_atom(current);
        let nb = bonds.len();
        let mut a0 = element.n_valence() as i64 - atom.formal_charge as i64;
        let (mut b0, mut b1, mut be) = (0i64, 0i64, 0i64);
        for bond in &bonds {
            a0 -= bond.order as i64;
            let other = bond.partner(current)?;
            if other == previous {
                b0 = bond.order as i64;
            } else if other == next {
                b1 = bond.order as i64;
            } else if nb == 3
                && atom.atomic_number == 6
                && system.atom(other)?.atomic_number == 6
            {
                be = bond.order as i64;
            }
        }
        if b0 == 0 || b1 == 0 {
            // Consecutive ring atoms are not bonded.
            return None;
        }
        if a0 < 0 || a0 % 2 != 0 {
            classes.push(RingAtomClass::Invalid);
            continue;
        }
        classes.push(classify_ring_atom(nb, a0 / 2, b0, b1, be));
    }
    Some(classes)
}

/// Classifies a ring. Any atom that cannot participate in an aromatic system
/// makes the whole ring non-aromatic.
pub fn classify_ring(system: &MolecularSystem, ring: &Ring) -> RingAromaticity {
    let Some(classes) = classify_ring_atoms(system, ring) else {
        return RingAromaticity::NonAromatic;
    };
    if classes.contains(&RingAtomClass::Invalid) {
        return RingAromaticity::NonAromatic;
    }
    let counts = classes.into_iter().counts();
    classify_ring_counts(
        counts.get(&RingAtomClass::X).copied().unwrap_or(0),
        counts.get(&RingAtomClass::Y).copied().unwrap_or(0),
        counts.get(&RingAtomClass::YExt).copied().unwrap_or(0),
    )
}

/// Planarity descriptor for a set of ring atoms: build the inertia tensor
/// about the centroid and apply the perpendicular axis theorem to its
/// ascending eigenvalues, returning `|v0 - (v1 + v2)|`. Exactly planar rings
/// score 0; callers threshold.
pub fn ring_planarity_descriptor(system: &MolecularSystem, atoms: &[AtomId]) -> f64 {
    let mut n = atoms.len();
    if n > 1 && atoms[0] == atoms[n - 1] {
        n -= 1;
    }
    if n < 3 {
        return 0.0;
    }
    let atoms = &atoms[..n];

    let mut centroid = nalgebra::Vector3::zeros();
    for &id in atoms {
        let Some(atom) = system.atom(id) else {
            return 0.0;
        };
        centroid += atom.position.coords;
    }
    centroid /= n as f64;

    let (mut ixx, mut iyy, mut izz) = (0.0, 0.0, 0.0);
    let (mut ixy, mut ixz, mut iyz) = (0.0, 0.0, 0.0);
    for &id in atoms {
        let r = system.atom(id).unwrap().position.coords - centroid;
        ixx += r.y * r.y + r.z * r.z;
        iyy += r.x * r.x + r.z * r.z;
        izz += r.x * r.x + r.y * r.y;
        ixy -= r.x * r.y;
        ixz -= r.x * r.z;
        iyz -= r.y * r.z;
    }
    let inertia = Matrix3::new(ixx, ixy, ixz, ixy, iyy, iyz, ixz, iyz, izz);
    let eigenvalues = inertia.symmetric_eigenvalues();
    let mut v = [eigenvalues[0], eigenvalues[1], eigenvalues[2]];
    v.sort_by(|a, b| a.partial_cmp(b).unwrap());
    (v[0] - (v[1] + v[2])).abs()
}

/// Recomputes the AROMATIC flags on atoms and bonds from the SSSR of the
/// whole system. Idempotent.
pub fn annotate_aromaticity(system: &mut MolecularSystem) {
    for id in system.atom_ids().to_vec() {
        if let Some(atom) = system.atom_mut(id) {
            atom.flags.remove(AtomFlags::AROMATIC);
        }
    }
    let bond_keys: Vec<(AtomId, AtomId)> = system.bonds().iter().map(|b| b.key()).collect();
    for (a, b) in &bond_keys {
        if let Some(bond) = system.bond_mut(*a, *b) {
            bond.aromatic = false;
        }
    }

    let rings = get_sssr(system, &[], false);
    for ring in rings {
        if classify_ring(system, &ring) != RingAromaticity::Aromatic {
            continue;
        }
        for &id in ring.atoms() {
            if let Some(atom) = system.atom_mut(id) {
                atom.flags.insert(AtomFlags::AROMATIC);
            }
        }
        for (a, b) in ring.edges() {
            if let Some(bond) = system.bond_mut(a, b) {
                bond.aromatic = true;
            }
        }
    }
}
