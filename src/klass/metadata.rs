//! Immutable class and method metadata.

use std::fmt;
use std::sync::Arc;

/// Index of a class in the class table. Stable across redefinitions.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u32);

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "class#{}", self.0)
    }
}

/// Method modifier bits, matching the classfile encoding.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MethodModifiers(pub u16);

impl MethodModifiers {
    pub const STATIC: u16 = 0x0008;
    pub const FINAL: u16 = 0x0010;
    pub const SYNCHRONIZED: u16 = 0x0020;
    pub const NATIVE: u16 = 0x0100;

    pub fn is_static(self) -> bool {
        self.0 & Self::STATIC != 0
    }

    pub fn is_final(self) -> bool {
        self.0 & Self::FINAL != 0
    }

    pub fn is_native(self) -> bool {
        self.0 & Self::NATIVE != 0
    }
}

/// One immutable version of one method. Never mutated after construction;
/// frames and backtraces hold it by `Arc` so it outlives redefinition of its
/// class for exactly as long as something still executes or reports it.
pub struct MethodVersion {
    pub class: ClassId,
    /// The class generation this version belongs to.
    pub generation: u16,
    pub name: Box<str>,
    pub modifiers: MethodModifiers,
    pub bytecode: Box<[u8]>,
    /// Sorted (bytecode index, source line) pairs.
    pub line_table: Box<[(u16, u16)]>,
}

impl MethodVersion {
    /// The source line covering `bci`, from the last line-table entry at or
    /// before it.
    pub fn line_for_bci(&self, bci: u16) -> Option<u16> {
        match self.line_table.binary_search_by_key(&bci, |&(b, _)| b) {
            Ok(i) => Some(self.line_table[i].1),
            Err(0) => None,
            Err(i) => Some(self.line_table[i - 1].1),
        }
    }
}

impl fmt::Debug for MethodVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}@g{}", self.class, self.name, self.generation)
    }
}

/// One complete, immutable generation of a class. The table swaps whole
/// generations; nothing in here changes after publication.
pub struct ClassGeneration {
    pub id: ClassId,
    pub generation: u16,
    pub name: Box<str>,
    pub super_class: Option<ClassId>,
    /// Number of reference fields in an instance. Fixed across generations.
    pub num_ref_fields: u16,
    /// Sorted by method name.
    pub methods: Box<[Arc<MethodVersion>]>,
}

impl ClassGeneration {
    pub fn method(&self, name: &str) -> Option<&Arc<MethodVersion>> {
        self.methods
            .binary_search_by(|m| m.name.as_ref().cmp(name))
            .ok()
            .map(|i| &self.methods[i])
    }
}

impl fmt::Debug for ClassGeneration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "ClassGeneration({} '{}' g{}, {} methods)",
            self.id,
            self.name,
            self.generation,
            self.methods.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(line_table: &[(u16, u16)]) -> MethodVersion {
        MethodVersion {
            class: ClassId(1),
            generation: 0,
            name: "run".into(),
            modifiers: MethodModifiers::default(),
            bytecode: Box::new([0, 1, 2, 3]),
            line_table: line_table.into(),
        }
    }

    #[test]
    fn line_for_bci_picks_covering_entry() {
        let m = version(&[(0, 10), (4, 11), (9, 13)]);
        assert_eq!(m.line_for_bci(0), Some(10));
        assert_eq!(m.line_for_bci(3), Some(10));
        assert_eq!(m.line_for_bci(4), Some(11));
        assert_eq!(m.line_for_bci(100), Some(13));
    }

    #[test]
    fn line_for_bci_with_empty_table() {
        let m = version(&[]);
        assert_eq!(m.line_for_bci(0), None);
    }

    #[test]
    fn modifiers_decode() {
        let m = MethodModifiers(MethodModifiers::STATIC | MethodModifiers::FINAL);
        assert!(m.is_static());
        assert!(m.is_final());
        assert!(!m.is_native());
    }
}
