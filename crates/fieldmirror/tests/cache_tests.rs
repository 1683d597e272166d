//! Integration tests for the descriptor cache

use std::sync::Arc;
use std::thread;

use fieldmirror::{reflect_record, DescriptorCache, ErasedValue, Reflector, TypeIdentity, TypeRegistryBuilder};

#[derive(Clone)]
struct Sensor {
    id: u32,
    reading: ErasedValue,
}

#[derive(Clone)]
struct Gauge {
    level: f32,
}

fn reflector() -> Reflector {
    let mut builder = TypeRegistryBuilder::with_primitives();
    reflect_record!(builder, Sensor { id, reading });
    reflect_record!(builder, Gauge { level });
    Reflector::new(builder.build().unwrap())
}

fn sensor(id: u32) -> Sensor {
    Sensor {
        id,
        reading: ErasedValue::new(id as f64),
    }
}

mod lazy_population {
    use super::*;

    #[test]
    fn test_starts_empty() {
        let reflector = reflector();
        assert!(reflector.cache().is_empty());
        assert!(reflector.cache().fields_by_name(TypeIdentity::of::<Sensor>()).is_none());
    }

    #[test]
    fn test_filled_on_first_mirror() {
        let reflector = reflector();
        reflector.mirror_of(sensor(1)).unwrap();
        reflector.mirror_of(sensor(2)).unwrap();
        reflector.mirror_of(Gauge { level: 0.5 }).unwrap();

        assert_eq!(reflector.cache().len(), 2);
        let table = reflector.cache().fields_by_name(TypeIdentity::of::<Sensor>()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("reading").unwrap().ty(), TypeIdentity::of::<f64>());
    }

    #[test]
    fn test_mirrors_share_table() {
        let reflector = reflector();
        let first = reflector.mirror_of(sensor(1)).unwrap();
        let second = reflector.mirror_of(sensor(2)).unwrap();

        let a = first.field("reading").unwrap() as *const _;
        let b = second.field("reading").unwrap() as *const _;
        assert_eq!(a, b);
    }

    #[test]
    fn test_standalone_cache() {
        let reflector = reflector();
        let layout = reflector.registry().describe(TypeIdentity::of::<Gauge>()).unwrap();
        let cache = DescriptorCache::new();

        let table = cache.ensure_cached(&layout, None);
        assert!(Arc::ptr_eq(&table, &cache.ensure_cached(&layout, None)));
        assert_eq!(table.owner(), TypeIdentity::of::<Gauge>());
    }
}

mod concurrency {
    use super::*;

    #[test]
    fn test_concurrent_first_use_publishes_one_table() {
        let reflector = reflector();

        let tables: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|id| {
                    let reflector = reflector.clone();
                    scope.spawn(move || {
                        let mirror = reflector.mirror_of(sensor(id)).unwrap();
                        assert_eq!(mirror.get_as::<u32>("id"), Some(id));
                        reflector.cache().fields_by_name(TypeIdentity::of::<Sensor>()).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|handle| handle.join().unwrap()).collect()
        });

        assert_eq!(reflector.cache().len(), 1);
        assert!(tables.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    }

    #[test]
    fn test_concurrent_writes_on_separate_mirrors() {
        let reflector = reflector();
        let shared = ErasedValue::new(sensor(0));

        thread::scope(|scope| {
            for id in 1..=4u32 {
                let reflector = reflector.clone();
                let shared = shared.clone();
                scope.spawn(move || {
                    let mut mirror = reflector.mirror(shared).unwrap();
                    mirror.set_named("id", ErasedValue::new(id));
                    assert_eq!(mirror.get_as::<u32>("id"), Some(id));
                });
            }
        });

        assert_eq!(shared.downcast_ref::<Sensor>().unwrap().id, 0);
    }
}
