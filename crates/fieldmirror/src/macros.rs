//! Registration helpers

/// Register a struct as a record or class, with every listed field and a
/// children view over them
///
/// ```rust,ignore
/// let mut builder = TypeRegistryBuilder::with_primitives();
/// reflect_record!(builder, Point { x, y });
/// reflect_record!(builder, class Shape { name });
/// reflect_record!(builder, class Circle: Shape [shape] { radius });
/// ```
///
/// In the last form `shape` is the field that embeds the `Shape` supertype;
/// it is not listed as a field of `Circle` itself, and it must be of type
/// `Shape`.
#[macro_export]
macro_rules! reflect_record {
    (@view $ty:ident { $($field:ident),* }) => {
        |any| match any.downcast_ref::<$ty>() {
            #[allow(unused_variables)]
            Some(value) => ::std::vec![$($crate::erase_field(&value.$field)),*],
            None => ::std::vec::Vec::new(),
        }
    };
    ($builder:expr, class $ty:ident : $base:ident [$embed:ident] { $($field:ident),* $(,)? }) => {
        $builder.class::<$ty>(stringify!($ty), |class| {
            class.extends_via::<$base>(::std::mem::offset_of!($ty, $embed), |value| &value.$embed);
            $( class.project(stringify!($field), ::std::mem::offset_of!($ty, $field), |value| &value.$field); )*
            class.view($crate::reflect_record!(@view $ty { $($field),* }));
        })
    };
    ($builder:expr, class $ty:ident { $($field:ident),* $(,)? }) => {
        $builder.class::<$ty>(stringify!($ty), |class| {
            $( class.project(stringify!($field), ::std::mem::offset_of!($ty, $field), |value| &value.$field); )*
            class.view($crate::reflect_record!(@view $ty { $($field),* }));
        })
    };
    ($builder:expr, $ty:ident { $($field:ident),* $(,)? }) => {
        $builder.record::<$ty>(stringify!($ty), |record| {
            $( record.project(stringify!($field), ::std::mem::offset_of!($ty, $field), |value| &value.$field); )*
            record.view($crate::reflect_record!(@view $ty { $($field),* }));
        })
    };
}
