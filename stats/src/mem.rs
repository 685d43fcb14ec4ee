use serde::{Deserialize, Serialize};

/// Kind of a memory reference issued by the traced program.
#[derive(
    Debug,
    strum::EnumIter,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
pub enum AccessKind {
    INST_FETCH,
    DATA_READ,
    DATA_WRITE,
}

impl AccessKind {
    #[must_use]
    pub fn is_instruction(self) -> bool {
        self == AccessKind::INST_FETCH
    }
}

impl std::fmt::Display for AccessKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let short = match self {
            AccessKind::INST_FETCH => "Ir",
            AccessKind::DATA_READ => "Dr",
            AccessKind::DATA_WRITE => "Dw",
        };
        f.write_str(short)
    }
}
