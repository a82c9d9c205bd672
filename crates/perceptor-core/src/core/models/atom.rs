use super::element::Element;
use super::ids::ResidueId;
use bitflags::bitflags;
use nalgebra::Point3;

bitflags! {
    #[derive(Default, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct AtomFlags: u8 {
        const AROMATIC = 0b0000_0001; // member of an aromatic SSSR ring
    }
}

/// A single atom record.
///
/// Atoms are owned by the system and addressed through stable [`AtomId`]
/// handles; every atom belongs to exactly one residue. An atomic number of 0
/// marks a pseudo particle (virtual site), which is excluded from filtered
/// connectivity queries and from perception.
///
/// [`AtomId`]: super::ids::AtomId
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    pub name: String,
    pub atomic_number: u8,
    pub formal_charge: i32,
    /// Point charge from a force field or import, in electrons.
    pub partial_charge: f64,
    /// Mean formal charge over resonance structures; mirrors `formal_charge`
    /// unless resonance averaging was requested.
    pub resonant_charge: f64,
    pub mass: f64,
    pub position: Point3<f64>,
    pub flags: AtomFlags,
    pub residue_id: ResidueId,
}

impl Atom {
    pub fn new(name: &str, residue_id: ResidueId) -> Self {
        Self {
            name: name.to_string(),
            atomic_number: 0,
            formal_charge: 0,
            partial_charge: 0.0,
            resonant_charge: 0.0,
            mass: 0.0,
            position: Point3::origin(),
            flags: AtomFlags::default(),
            residue_id,
        }
    }

    /// The element for this atom, or `None` for pseudo particles.
    pub fn element(&self) -> Option<Element> {
        Element::from_atomic_number(self.atomic_number)
    }

    #[inline]
    pub fn is_pseudo(&self) -> bool {
        self.atomic_number < 1
    }

    #[inline]
    pub fn is_aromatic(&self) -> bool {
        self.flags.contains(AtomFlags::AROMATIC)
    }
}
