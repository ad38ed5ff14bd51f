//! In-place field copying

mod test_support;

use shapemap_core::{Overrides, TierKind, Value, ValueMap};
use test_support::*;

#[test]
fn test_copy_overwrites_bound_fields() {
    let engine = interpreted_engine();
    let mut target = PersonDto {
        name: "old".to_string(),
        age: 1,
        email: "old@example.com".to_string(),
        score: "0".to_string(),
    };
    engine
        .copy_fields(&ann(), &mut target, &Overrides::new())
        .unwrap();
    assert_eq!(target.name, "Ann");
    assert_eq!(target.age, 30);
    assert_eq!(target.email, "");
    assert_eq!(target.score, "2.5");
}

#[test]
fn test_excluded_fields_are_never_overwritten() {
    let engine = interpreted_engine();
    let mut target = PersonDto {
        email: "keep@example.com".to_string(),
        score: "keep".to_string(),
        ..PersonDto::default()
    };
    let rules = Overrides::<Person, PersonDto>::new().exclude("email").exclude("score");
    engine.copy_fields(&ann(), &mut target, &rules).unwrap();
    assert_eq!(target.name, "Ann");
    assert_eq!(target.email, "keep@example.com");
    assert_eq!(target.score, "keep");
}

#[test]
fn test_constructor_only_fields_are_untouched() {
    let engine = interpreted_engine();
    let mut invoice = Invoice {
        reference: "INV-1".to_string(),
        currency: "EUR".to_string(),
        total: 0,
    };
    let rules = Overrides::<Order, Invoice>::new()
        .from_field("reference", "code")
        .from_field("currency", "code")
        .compute("total", |o: &Order| o.price * o.qty);
    engine.copy_fields(&order(), &mut invoice, &rules).unwrap();

    // reference has no setter, currency is writable as well as a constructor slot
    assert_eq!(invoice.reference, "INV-1");
    assert_eq!(invoice.currency, "A-1");
    assert_eq!(invoice.total, 12);
}

#[test]
fn test_copier_from_open_map() {
    let engine = interpreted_engine();
    let copier = engine
        .copier_between(
            &shapemap_core::shape::MapShape,
            &shapemap_core::Introspect::<PersonDto>::new(),
            &Overrides::<ValueMap, PersonDto>::new().exclude("score"),
        )
        .unwrap();

    let mut map = ValueMap::new();
    map.insert("age".to_string(), Value::from(41i64));
    let mut target = PersonDto {
        name: "kept?".to_string(),
        score: "kept".to_string(),
        ..PersonDto::default()
    };
    copier.copy_fields(&map, &mut target).unwrap();

    // absent keys read as null and go through the null policy
    assert_eq!(target.name, "");
    assert_eq!(target.age, 41);
    assert_eq!(target.score, "kept");
}

#[test]
fn test_copier_upgrades_and_keeps_copying() {
    let engine = eager_engine();
    let copier = engine.field_copier(&Overrides::<Person, PersonDto>::new()).unwrap();
    let mut target = PersonDto::default();

    copier.copy_fields(&ann(), &mut target).unwrap();
    wait_for_tier(TierKind::FullySpecialized, || copier.active_tier());

    let mut again = PersonDto::default();
    copier.copy_fields(&ann(), &mut again).unwrap();
    assert_eq!(target, again);
}
