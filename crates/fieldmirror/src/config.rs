//! Mirror configuration

/// Configuration shared by every mirror created from one reflector
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Mutate the subject's storage in place when no other holder shares it
    /// (default: true). When false, every write copies the whole value first.
    pub mutate_unique_in_place: bool,
    /// Let `reflecting` retry with the value opened out of a nested erased
    /// wrapper before failing (default: true)
    pub retry_boxed: bool,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        MirrorConfig {
            mutate_unique_in_place: true,
            retry_boxed: true,
        }
    }
}
