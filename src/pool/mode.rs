/// Routing mode of a single pool operation.
///
/// Selection within a mode is round-robin over the currently eligible
/// instances; each mode advances its own cursor.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Any currently connected instance.
    Any,
    /// Any instance whose last role probe observed read-write state.
    Rw,
    /// Any instance whose last role probe observed read-only state.
    Ro,
    /// Read-write set if non-empty, read-only set otherwise.
    PreferRw,
    /// Read-only set if non-empty, read-write set otherwise.
    PreferRo,
}

impl Mode {
    pub(crate) const COUNT: usize = 5;

    pub(crate) fn index(self) -> usize {
        match self {
            Mode::Any => 0,
            Mode::Rw => 1,
            Mode::Ro => 2,
            Mode::PreferRw => 3,
            Mode::PreferRo => 4,
        }
    }
}
