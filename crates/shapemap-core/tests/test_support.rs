//! Shared shapes for the integration tests
#![allow(dead_code)]

use shapemap_core::shape::{Describe, ShapeBuilder, Slot};
use shapemap_core::{value_wrapper, Engine, MapperConfig, TierKind};
use std::time::{Duration, Instant};

/// Source person; `email` is nullable
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Person {
    pub name: String,
    pub age: i32,
    pub email: Option<String>,
    pub score: f64,
}

impl Describe for Person {
    fn describe(shape: &mut ShapeBuilder<Self>) {
        shape
            .field("name", |p: &Person| p.name.clone(), |p, v| p.name = v)
            .field("age", |p: &Person| p.age, |p, v| p.age = v)
            .field("email", |p: &Person| p.email.clone(), |p, v| p.email = v)
            .field("score", |p: &Person| p.score, |p, v| p.score = v)
            .default_constructor(Person::default);
    }
}

/// Target with wider and non-nullable fields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersonDto {
    pub name: String,
    pub age: i64,
    pub email: String,
    pub score: String,
}

impl Describe for PersonDto {
    fn describe(shape: &mut ShapeBuilder<Self>) {
        shape
            .field("name", |p: &PersonDto| p.name.clone(), |p, v| p.name = v)
            .field("age", |p: &PersonDto| p.age, |p, v| p.age = v)
            .field("email", |p: &PersonDto| p.email.clone(), |p, v| p.email = v)
            .field("score", |p: &PersonDto| p.score.clone(), |p, v| p.score = v)
            .default_constructor(PersonDto::default);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Order {
    pub code: String,
    pub price: i64,
    pub qty: i64,
    pub total: i64,
}

impl Describe for Order {
    fn describe(shape: &mut ShapeBuilder<Self>) {
        shape
            .field("code", |o: &Order| o.code.clone(), |o, v| o.code = v)
            .field("price", |o: &Order| o.price, |o, v| o.price = v)
            .field("qty", |o: &Order| o.qty, |o, v| o.qty = v)
            .field("total", |o: &Order| o.total, |o, v| o.total = v)
            .default_constructor(Order::default);
    }
}

/// Built through a constructor: `reference` is mandatory, `currency` optional
#[derive(Debug, Clone, PartialEq)]
pub struct Invoice {
    pub reference: String,
    pub currency: String,
    pub total: i64,
}

impl Describe for Invoice {
    fn describe(shape: &mut ShapeBuilder<Self>) {
        shape
            .readonly("reference", |i: &Invoice| i.reference.clone())
            .field("total", |i: &Invoice| i.total, |i, v| i.total = v)
            .field("currency", |i: &Invoice| i.currency.clone(), |i, v| i.currency = v)
            .constructor(
                [
                    Slot::required::<String>("reference"),
                    Slot::with_default("currency", "EUR".to_string()),
                ],
                |args| {
                    Ok(Invoice {
                        reference: args.take("reference")?,
                        currency: args.take_or("currency", "EUR".to_string())?,
                        total: 0,
                    })
                },
            );
    }
}

/// Mandatory `id` no other shape provides
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: i64,
    pub name: String,
}

impl Describe for Account {
    fn describe(shape: &mut ShapeBuilder<Self>) {
        shape
            .readonly("id", |a: &Account| a.id)
            .field("name", |a: &Account| a.name.clone(), |a, v| a.name = v)
            .constructor([Slot::required::<i64>("id")], |args| {
                Ok(Account {
                    id: args.take("id")?,
                    name: String::new(),
                })
            });
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserId(pub i64);
value_wrapper!(UserId, i64);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct User {
    pub id: Option<UserId>,
    pub login: String,
}

impl Describe for User {
    fn describe(shape: &mut ShapeBuilder<Self>) {
        shape
            .field("id", |u: &User| u.id.clone(), |u, v| u.id = v)
            .field("login", |u: &User| u.login.clone(), |u, v| u.login = v)
            .default_constructor(User::default);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserRow {
    pub id: i64,
    pub login: String,
}

impl Describe for UserRow {
    fn describe(shape: &mut ShapeBuilder<Self>) {
        shape
            .field("id", |u: &UserRow| u.id, |u, v| u.id = v)
            .field("login", |u: &UserRow| u.login.clone(), |u, v| u.login = v)
            .default_constructor(UserRow::default);
    }
}

pub fn ann() -> Person {
    Person {
        name: "Ann".to_string(),
        age: 30,
        email: None,
        score: 2.5,
    }
}

pub fn order() -> Order {
    Order {
        code: "A-1".to_string(),
        price: 3,
        qty: 4,
        total: 0,
    }
}

/// Engine that never upgrades
pub fn interpreted_engine() -> Engine {
    Engine::builder()
        .config(MapperConfig::interpreted_only())
        .build()
        .unwrap()
}

/// Engine that schedules an upgrade on the first call
pub fn eager_engine() -> Engine {
    Engine::builder().config(MapperConfig::eager()).build().unwrap()
}

/// Poll until `current` reports `expected`
pub fn wait_for_tier(expected: TierKind, current: impl Fn() -> TierKind) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while current() != expected {
        assert!(
            Instant::now() < deadline,
            "tier stayed at {} instead of {}",
            current(),
            expected
        );
        std::thread::sleep(Duration::from_millis(5));
    }
}
