//! Cache identity and tier upgrades under concurrent use

mod test_support;

use shapemap_core::{
    CapacityLimit, Engine, MapperConfig, Overrides, SchedulerConfig, TierKind, UpgradeState,
};
use std::sync::{Arc, Barrier};
use std::thread;
use test_support::*;

#[test]
fn test_concurrent_requests_share_one_mapper() {
    let engine = Arc::new(interpreted_engine());
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                engine.auto_mapper(&Overrides::<Person, PersonDto>::new()).unwrap()
            })
        })
        .collect();

    let mappers: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(mappers.iter().all(|m| m.same_instance(&mappers[0])));
    assert_eq!(engine.cache().len(), 1);
}

#[test]
fn test_results_stay_correct_across_the_upgrade() {
    let engine = Arc::new(
        Engine::builder()
            .config(MapperConfig {
                start_compile_after_iterations: 50,
                ..MapperConfig::default()
            })
            .build()
            .unwrap(),
    );
    let expected: PersonDto = interpreted_engine().transform(&ann()).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = engine.clone();
            let expected = expected.clone();
            thread::spawn(move || {
                let mapper = engine.auto_mapper(&Overrides::<Person, PersonDto>::new()).unwrap();
                for _ in 0..500 {
                    assert_eq!(mapper.transform(&ann()).unwrap(), expected);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mapper = engine.auto_mapper(&Overrides::<Person, PersonDto>::new()).unwrap();
    wait_for_tier(TierKind::FullySpecialized, || mapper.active_tier());
    assert_eq!(mapper.transform(&ann()).unwrap(), expected);
    assert_eq!(mapper.instance().invocations(), 2001);
}

#[test]
fn test_full_compile_can_be_capped() {
    let engine = Engine::builder()
        .config(MapperConfig {
            disable_full_compile: true,
            ..MapperConfig::eager()
        })
        .build()
        .unwrap();
    let mapper = engine.auto_mapper(&Overrides::<Person, PersonDto>::new()).unwrap();
    mapper.transform(&ann()).unwrap();
    wait_for_tier(TierKind::PartiallySpecialized, || mapper.active_tier());
    assert_eq!(mapper.instance().upgrade_state(), UpgradeState::Upgraded);
}

#[test]
fn test_wrapper_plans_stop_at_partial() {
    let engine = eager_engine();
    let mapper = engine.auto_mapper(&Overrides::<User, UserRow>::new()).unwrap();
    let user = User {
        id: Some(UserId(3)),
        login: "u".to_string(),
    };
    mapper.transform(&user).unwrap();
    wait_for_tier(TierKind::PartiallySpecialized, || mapper.active_tier());
    assert_eq!(mapper.transform(&user).unwrap().id, 3);
}

#[test]
fn test_shutdown_leaves_mappers_working() {
    let engine = eager_engine();
    engine.shutdown();
    let mapper = engine.auto_mapper(&Overrides::<Person, PersonDto>::new()).unwrap();
    for _ in 0..3 {
        assert_eq!(mapper.transform(&ann()).unwrap().name, "Ann");
    }
    assert_eq!(mapper.active_tier(), TierKind::Interpreted);
    assert_eq!(mapper.instance().upgrade_state(), UpgradeState::Rejected);
}

#[test]
fn test_single_worker_pool_serves_many_mappers() {
    let engine = Engine::builder()
        .config(MapperConfig {
            scheduler: SchedulerConfig {
                max_workers: 1,
                queue_capacity: 16,
                thread_name: "single".to_string(),
            },
            ..MapperConfig::eager()
        })
        .build()
        .unwrap();

    let to_dto = engine.auto_mapper(&Overrides::<Person, PersonDto>::new()).unwrap();
    let to_person = engine.auto_mapper(&Overrides::<PersonDto, Person>::new()).unwrap();
    let dto = to_dto.transform(&ann()).unwrap();
    to_person.transform(&dto).unwrap();

    wait_for_tier(TierKind::FullySpecialized, || to_dto.active_tier());
    wait_for_tier(TierKind::FullySpecialized, || to_person.active_tier());
}

#[test]
fn test_capacity_limited_cache() {
    let engine = Engine::builder()
        .config(MapperConfig::interpreted_only())
        .eviction(Box::new(CapacityLimit::new(1)))
        .build()
        .unwrap();
    let first = engine.auto_mapper(&Overrides::<Person, PersonDto>::new()).unwrap();
    engine.auto_mapper(&Overrides::<Order, Order>::new()).unwrap();
    assert_eq!(engine.cache().len(), 1);

    // an evicted mapper keeps working; a new request builds a fresh one
    assert_eq!(first.transform(&ann()).unwrap().name, "Ann");
    let again = engine.auto_mapper(&Overrides::<Person, PersonDto>::new()).unwrap();
    assert!(!again.same_instance(&first));
}
