use slotmap::new_key_type;

new_key_type! {
    pub struct AtomId;
    pub struct ResidueId;
    pub struct ChainId;
    pub struct ParamTableId;
}

/// Dense, 0-based index of a row in a parameter table.
pub type ParamId = usize;
