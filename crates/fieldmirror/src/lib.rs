//! Fieldmirror: runtime field reflection for registered Rust types
//!
//! This crate lets generic code enumerate, read and write the fields of a
//! value whose static type it does not know:
//! - **Registry**: explicit registration of records, classes, tuples and
//!   their optional wrappers (`registry` module, `reflect_record!`)
//! - **Layouts**: byte offsets, kinds and supertype chains (`layout` module)
//! - **Access**: copying a field out and reinitialising it in place
//!   (`access` module)
//! - **Mirrors**: a live view over one value, with copy-on-write field
//!   updates (`mirror` and `traverse` modules)
//! - **Cache**: per-type field tables shared across threads (`cache` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use fieldmirror::{reflect_record, ErasedValue, Reflector, TypeRegistryBuilder};
//!
//! #[derive(Clone)]
//! struct Point {
//!     x: i64,
//!     y: i64,
//! }
//!
//! let mut builder = TypeRegistryBuilder::with_primitives();
//! reflect_record!(builder, Point { x, y });
//! let reflector = Reflector::new(builder.build()?);
//!
//! let mut mirror = reflector.mirror_of(Point { x: 1, y: 2 }).unwrap();
//! mirror.set_named("y", ErasedValue::new(5i64));
//! assert_eq!(mirror.get_as::<i64>("y"), Some(5));
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[macro_use]
mod macros;

pub mod access;
pub mod cache;
pub mod config;
pub mod error;
pub mod identity;
pub mod layout;
pub mod mirror;
pub mod reflector;
pub mod registry;
pub mod traverse;
pub mod value;

pub use access::{FieldSlot, ValueOps};
pub use cache::{DescriptorCache, FieldTable};
pub use config::MirrorConfig;
pub use error::{MirrorError, MirrorResult};
pub use identity::{Capability, TypeIdentity};
pub use layout::{ChildrenView, FieldDescriptor, LayoutDescriptor, LayoutKind};
pub use mirror::InstanceMirror;
pub use reflector::Reflector;
pub use registry::{ClassBuilder, RecordBuilder, TupleLayout, TypeRegistry, TypeRegistryBuilder};
pub use value::{erase_field, AnyStorage, ErasedValue, Reflectable};
