//! Property-based tests for tier equivalence
//!
//! Every tier runs the same plan, so for any input the three tiers must
//! produce field-for-field identical targets, or fail the same way.

mod test_support;

use proptest::prelude::*;
use shapemap_core::{
    AutoMapper, Engine, FieldType, MapperConfig, Overrides, Record, RecordSchema, SemType, TierKind, Value,
};
use std::thread;
use test_support::*;

struct Tiers<S, T> {
    _engines: Vec<Engine>,
    mappers: Vec<AutoMapper<S, T>>,
}

fn tiers<S, T>(make: impl Fn(&Engine) -> AutoMapper<S, T>) -> Tiers<S, T>
where
    S: 'static,
    T: 'static,
{
    let mut engines = Vec::new();
    let mut mappers = Vec::new();
    for kind in [
        TierKind::Interpreted,
        TierKind::PartiallySpecialized,
        TierKind::FullySpecialized,
    ] {
        let engine = Engine::builder()
            .config(MapperConfig::interpreted_only())
            .build()
            .unwrap();
        let mapper = make(&engine);
        assert_eq!(mapper.specialize(kind).unwrap(), kind);
        mappers.push(mapper);
        engines.push(engine);
    }
    Tiers {
        _engines: engines,
        mappers,
    }
}

fn person_strategy() -> impl Strategy<Value = Person> {
    (
        "[a-zA-Z ]{0,24}",
        any::<i32>(),
        proptest::option::of("[a-z]{1,10}@[a-z]{1,10}\\.com"),
        -1.0e9f64..1.0e9,
    )
        .prop_map(|(name, age, email, score)| Person {
            name,
            age,
            email,
            score,
        })
}

fn order_strategy() -> impl Strategy<Value = Order> {
    ("[A-Z]-[0-9]{1,4}", -10_000i64..10_000, -10_000i64..10_000, any::<i64>()).prop_map(
        |(code, price, qty, total)| Order {
            code,
            price,
            qty,
            total,
        },
    )
}

fn dto_strategy() -> impl Strategy<Value = PersonDto> {
    (
        "[a-zA-Z]{0,12}",
        any::<i64>(),
        "[a-z]{0,8}",
        prop_oneof![
            (-1.0e6f64..1.0e6).prop_map(|f| f.to_string()),
            "[a-z]{1,4}".prop_map(String::from),
        ],
    )
        .prop_map(|(name, age, email, score)| PersonDto {
            name,
            age,
            email,
            score,
        })
}

proptest! {
    #[test]
    fn prop_person_to_dto_agrees_on_every_tier(person in person_strategy()) {
        let tiers = tiers(|e| e.auto_mapper(&Overrides::<Person, PersonDto>::new()).unwrap());
        let results: Vec<PersonDto> = tiers
            .mappers
            .iter()
            .map(|m| m.transform(&person).unwrap())
            .collect();
        prop_assert_eq!(&results[0], &results[1]);
        prop_assert_eq!(&results[1], &results[2]);
        prop_assert_eq!(results[0].age, i64::from(person.age));
    }

    #[test]
    fn prop_overrides_agree_on_every_tier(order in order_strategy()) {
        let tiers = tiers(|e| {
            e.auto_mapper(
                &Overrides::<Order, Invoice>::new()
                    .from_field("reference", "code")
                    .compute("total", |o: &Order| o.price * o.qty),
            )
            .unwrap()
        });
        let results: Vec<Invoice> = tiers
            .mappers
            .iter()
            .map(|m| m.transform(&order).unwrap())
            .collect();
        prop_assert_eq!(&results[0], &results[1]);
        prop_assert_eq!(&results[1], &results[2]);
        prop_assert_eq!(results[0].total, order.price * order.qty);
    }

    #[test]
    fn prop_failures_agree_on_every_tier(dto in dto_strategy()) {
        // narrowing i64 -> i32 and parsing the score can both fail
        let tiers = tiers(|e| e.auto_mapper(&Overrides::<PersonDto, Person>::new()).unwrap());
        let results: Vec<Result<Person, String>> = tiers
            .mappers
            .iter()
            .map(|m| m.transform(&dto).map_err(|e| e.to_string()))
            .collect();
        prop_assert_eq!(&results[0], &results[1]);
        prop_assert_eq!(&results[1], &results[2]);
    }

    #[test]
    fn prop_mapping_is_idempotent(person in person_strategy()) {
        let engine = eager_engine();
        let mapper = engine.auto_mapper(&Overrides::<Person, PersonDto>::new()).unwrap();
        let first = mapper.transform(&person).unwrap();
        let second = mapper.transform(&person).unwrap();
        prop_assert_eq!(first, second);
    }
}

const WIDE_FIELDS: usize = 5_000;

/// Stack of a default test thread
const TEST_STACK: usize = 2 * 1024 * 1024;

#[test]
fn test_wide_record_agrees_on_every_tier() {
    let worker = thread::Builder::new()
        .stack_size(TEST_STACK)
        .spawn(|| {
            let names: Vec<String> = (0..WIDE_FIELDS).map(|i| format!("f{i}")).collect();
            let from = names
                .iter()
                .fold(RecordSchema::builder("WideIn"), |b, n| b.field(n, FieldType::required(SemType::I32)))
                .build()
                .unwrap();
            let to = names
                .iter()
                .fold(RecordSchema::builder("WideOut"), |b, n| b.field(n, FieldType::required(SemType::I64)))
                .build()
                .unwrap();

            let mut source = Record::new(from.clone());
            for (i, name) in names.iter().enumerate() {
                source.set(name, i as i32).unwrap();
            }

            let tiers = tiers(|e| {
                e.mapper_between::<Record, Record>(&from, &to, &Overrides::new())
                    .unwrap()
            });
            let results: Vec<Record> = tiers
                .mappers
                .iter()
                .map(|m| m.transform(&source).unwrap())
                .collect();

            assert_eq!(results[0], results[1]);
            assert_eq!(results[1], results[2]);
            assert_eq!(results[2].get("f4999"), Some(&Value::from(4_999i64)));
        })
        .unwrap();
    worker.join().unwrap();
}
