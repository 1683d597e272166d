//! Reflection errors

use thiserror::Error;

/// Errors reported by the registry and by mirrors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MirrorError {
    /// No layout can be derived for the value, even after the boxed retry
    #[error("Cannot reflect value of type `{type_name}`")]
    Unreflectable {
        /// Registered or compiler name of the type
        type_name: String,
    },

    /// A field was written with a value of a different dynamic type
    #[error("Field `{field}` holds `{expected}`, cannot store `{found}`")]
    FieldTypeMismatch {
        /// Field written
        field: String,
        /// Type the field holds
        expected: String,
        /// Type of the rejected value
        found: String,
    },

    /// A field name did not resolve on the reflected type or its supertypes
    #[error("Type `{type_name}` has no field named `{field}`")]
    UnknownField {
        /// Reflected type
        type_name: String,
        /// Name that did not resolve
        field: String,
    },

    /// A field descriptor that belongs to another type was used
    #[error("Field `{field}` of `{owner}` does not belong to `{type_name}`")]
    ForeignField {
        /// Field name
        field: String,
        /// Type that declares the field
        owner: String,
        /// Reflected type
        type_name: String,
    },

    /// The same type or name was registered twice
    #[error("Type `{name}` is already registered")]
    DuplicateType {
        /// Name of the second registration
        name: String,
    },

    /// A class extends a type that was never registered
    #[error("Class `{class}` extends unregistered type `{supertype}`")]
    UnknownSupertype {
        /// Extending class
        class: String,
        /// Missing supertype
        supertype: String,
    },

    /// A class extends a type that is not itself a class
    #[error("Class `{class}` extends `{supertype}`, which is not a class")]
    SupertypeNotClass {
        /// Extending class
        class: String,
        /// Registered name of the supertype
        supertype: String,
    },

    /// A class appears in its own supertype chain
    #[error("Class hierarchy of `{class}` is cyclic")]
    CyclicHierarchy {
        /// Class whose chain loops
        class: String,
    },

    /// A field or embedded supertype extends past the end of its owner
    #[error("`{field}` at offset {offset} (+{size} bytes) exceeds the {owner_size}-byte `{owner}`")]
    FieldOutOfBounds {
        /// Type the field or supertype belongs to
        owner: String,
        /// Field or supertype name
        field: String,
        /// Registered offset
        offset: usize,
        /// Byte size of the field
        size: usize,
        /// Byte size of the owner
        owner_size: usize,
    },

    /// A field or embedded supertype offset is not a multiple of its alignment
    #[error("`{field}` of `{owner}` at offset {offset} is not {align}-byte aligned")]
    MisalignedField {
        /// Type the field or supertype belongs to
        owner: String,
        /// Field or supertype name
        field: String,
        /// Registered offset
        offset: usize,
        /// Required alignment
        align: usize,
    },

    /// A projected field was registered at an offset its projection does not reach
    #[error("`{field}` of `{owner}` is registered at offset {declared} but its projection lands at {actual}")]
    MisplacedField {
        /// Type the field or supertype belongs to
        owner: String,
        /// Field or supertype name
        field: String,
        /// Registered offset
        declared: usize,
        /// Offset the projection reached on a live value
        actual: usize,
    },
}

/// Reflection result
pub type MirrorResult<T> = Result<T, MirrorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = MirrorError::Unreflectable {
            type_name: "Widget".to_string(),
        };
        assert_eq!(err.to_string(), "Cannot reflect value of type `Widget`");

        let err = MirrorError::FieldTypeMismatch {
            field: "count".to_string(),
            expected: "i64".to_string(),
            found: "u8".to_string(),
        };
        assert_eq!(err.to_string(), "Field `count` holds `i64`, cannot store `u8`");
    }
}
