//! Integration tests for capability-filtered traversal

use fieldmirror::{reflect_record, Capability, ErasedValue, Reflector, TypeRegistryBuilder};

trait Validate {
    fn is_valid(&self) -> bool;
}

#[derive(Clone)]
struct Email {
    address: String,
}

impl Validate for Email {
    fn is_valid(&self) -> bool {
        self.address.contains('@')
    }
}

#[derive(Clone)]
struct Contact {
    email: Email,
    visits: u32,
}

#[derive(Clone)]
struct Team {
    lead: Contact,
    backup: Option<Contact>,
    size: u16,
}

#[derive(Clone)]
struct Slot {
    held: ErasedValue,
}

fn reflector() -> Reflector {
    let mut builder = TypeRegistryBuilder::with_primitives();
    builder.record::<Email>("Email", |record| {
        record
            .project("address", std::mem::offset_of!(Email, address), |e| &e.address)
            .conforms::<dyn Validate>();
    });
    reflect_record!(builder, Contact { email, visits });
    reflect_record!(builder, Team { lead, backup, size });
    reflect_record!(builder, Slot { held });
    Reflector::new(builder.build().unwrap())
}

fn contact(address: &str) -> Contact {
    Contact {
        email: Email {
            address: address.to_string(),
        },
        visits: 0,
    }
}

fn validate() -> Capability {
    Capability::of::<dyn Validate>()
}

// ============================================================================
// Single level
// ============================================================================

mod single_level {
    use super::*;

    #[test]
    fn test_each_child_reported_once() {
        let reflector = reflector();
        let mirror = reflector.mirror_of(contact("a@b")).unwrap();

        let mut matched = Vec::new();
        let mut missed = Vec::new();
        mirror.for_each_child(
            validate(),
            |name, value| {
                let email = value.downcast_ref::<Email>().unwrap();
                assert!(email.is_valid());
                matched.push(name.to_string());
            },
            |name, _| missed.push(name.to_string()),
        );

        assert_eq!(matched, ["email"]);
        assert_eq!(missed, ["visits"]);
    }

    #[test]
    fn test_no_conforming_children() {
        let reflector = reflector();
        let mirror = reflector
            .mirror_of(Team {
                lead: contact("x@y"),
                backup: None,
                size: 1,
            })
            .unwrap();

        let mut matched = 0;
        let mut missed = 0;
        mirror.for_each_child(validate(), |_, _| matched += 1, |_, _| missed += 1);
        assert_eq!((matched, missed), (0, 3));
    }
}

// ============================================================================
// Recursive descent
// ============================================================================

mod recursive {
    use super::*;

    #[test]
    fn test_finds_nested_conformers() {
        let reflector = reflector();
        let team = Team {
            lead: contact("lead@team"),
            backup: Some(contact("backup@team")),
            size: 2,
        };
        let mirror = reflector.mirror_of(team).unwrap();

        let mut addresses = Vec::new();
        mirror.recursive_for_each_child(validate(), |_, value| {
            addresses.push(value.downcast_ref::<Email>().unwrap().address.clone());
        });
        assert_eq!(addresses, ["lead@team", "backup@team"]);
    }

    #[test]
    fn test_absent_optional_skipped() {
        let reflector = reflector();
        let team = Team {
            lead: contact("lead@team"),
            backup: None,
            size: 1,
        };
        let mirror = reflector.mirror_of(team).unwrap();

        let mut count = 0;
        mirror.recursive_for_each_child(validate(), |_, _| count += 1);
        assert_eq!(count, 1);
    }

    #[test]
    #[should_panic(expected = "holds an InstanceMirror")]
    fn test_nested_mirror_panics() {
        let reflector = reflector();
        let inner = reflector.mirror_of(contact("a@b")).unwrap();
        let slot = Slot {
            held: ErasedValue::new(inner),
        };
        let mirror = reflector.mirror_of(slot).unwrap();
        mirror.recursive_for_each_child(validate(), |_, _| {});
    }
}
