//! State handle scenarios, run against both document store backends.

use std::sync::Arc;

use cluster_state::{Charm, CharmMeta, ErrorKind, Life, State};
use cluster_state_core::{CharmUrl, MachineId};
use cluster_state_store::{collection, DocStore, Document, MemoryDocStore, RocksDocStore};
use serde_json::json;
use tempfile::TempDir;

fn memory_state() -> State<MemoryDocStore> {
    State::with_defaults(Arc::new(MemoryDocStore::new()))
}

fn rocks_state() -> (State<RocksDocStore>, TempDir) {
    let dir = TempDir::new().unwrap();
    let store = RocksDocStore::open(dir.path()).unwrap();
    (State::with_defaults(Arc::new(store)), dir)
}

macro_rules! on_both_backends {
    ($($name:ident),* $(,)?) => {
        mod memory {
            $(
                #[test]
                fn $name() {
                    super::$name(&super::memory_state());
                }
            )*
        }

        mod rocks {
            $(
                #[test]
                fn $name() {
                    let (state, _dir) = super::rocks_state();
                    super::$name(&state);
                }
            )*
        }
    };
}

on_both_backends!(
    add_machine,
    remove_machine,
    read_machine,
    all_machines_reads_raw_documents,
    add_charm,
    add_service,
    remove_service,
    read_non_existent_service,
    all_services,
    service_with_units_dies_then_goes,
);

fn add_testing_charm<S: DocStore>(state: &State<S>, name: &str) -> Charm {
    let ident = format!("{name}-1");
    let url: CharmUrl = format!("local:series/{ident}").parse().unwrap();
    let meta = CharmMeta {
        name: name.to_string(),
        summary: "That's a dummy charm.".to_string(),
        description: "This is a longer description.".to_string(),
        revision: 1,
    };
    state
        .add_charm(
            meta,
            &url,
            &format!("http://bundles.example.com/{ident}"),
            &format!("{ident}-sha256"),
        )
        .unwrap()
}

fn machine_names<S: DocStore>(state: &State<S>) -> Vec<String> {
    state
        .all_machines()
        .unwrap()
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn service_names<S: DocStore>(state: &State<S>) -> Vec<String> {
    state
        .all_services()
        .unwrap()
        .iter()
        .map(|s| s.name().to_string())
        .collect()
}

fn add_machine<S: DocStore>(state: &State<S>) {
    let machine0 = state.add_machine().unwrap();
    assert_eq!(machine0.id().get(), 0);
    let machine1 = state.add_machine().unwrap();
    assert_eq!(machine1.id().get(), 1);

    assert_eq!(
        machine_names(state),
        vec!["machine-0000000000", "machine-0000000001"]
    );
}

fn remove_machine<S: DocStore>(state: &State<S>) {
    let machine = state.add_machine().unwrap();
    state.add_machine().unwrap();
    state.remove_machine(machine.id()).unwrap();

    assert_eq!(machine_names(state), vec!["machine-0000000001"]);
    assert!(state.machine(machine.id()).unwrap_err().is_not_found());

    // Removing a non-existing machine has to fail.
    let err = state.remove_machine(machine.id()).unwrap_err();
    assert!(err.to_string().starts_with("can't remove machine 0: "));
    assert_eq!(err.kind(), &ErrorKind::NotFound);
}

fn read_machine<S: DocStore>(state: &State<S>) {
    let machine = state.add_machine().unwrap();
    let fetched = state.machine(machine.id()).unwrap();
    assert_eq!(fetched.id(), machine.id());
    assert_eq!(fetched.life(), Life::Alive);
}

fn all_machines_reads_raw_documents<S: DocStore>(state: &State<S>) {
    let inserts = 42u64;
    for i in 0..inserts {
        state
            .store()
            .insert(
                collection::MACHINES,
                Document::from_record(&json!({"_id": i, "life": "alive"})).unwrap(),
            )
            .unwrap();
    }

    let machines = state.all_machines().unwrap();
    assert_eq!(machines.len() as u64, inserts);
    for (k, machine) in machines.iter().enumerate() {
        assert_eq!(machine.id(), MachineId::new(k as u64));
    }

    // New machines continue after the inserted ones.
    assert_eq!(state.add_machine().unwrap().id().get(), inserts);
}

fn add_charm<S: DocStore>(state: &State<S>) {
    let dummy = add_testing_charm(state, "dummy");
    assert_eq!(dummy.url().to_string(), "local:series/dummy-1");

    let stored = state.charm(dummy.url()).unwrap();
    assert_eq!(stored.bundle_sha256(), "dummy-1-sha256");
    assert_eq!(stored.meta().summary, "That's a dummy charm.");

    // Identical re-add is accepted and does not duplicate.
    let again = add_testing_charm(state, "dummy");
    assert_eq!(again, stored);
}

fn add_service<S: DocStore>(state: &State<S>) {
    let charm = add_testing_charm(state, "dummy");
    let wordpress = state.add_service("wordpress", &charm).unwrap();
    assert_eq!(wordpress.name().as_str(), "wordpress");
    let mysql = state.add_service("mysql", &charm).unwrap();
    assert_eq!(mysql.name().as_str(), "mysql");

    let wordpress = state.service("wordpress").unwrap();
    assert_eq!(wordpress.charm_url().to_string(), "local:series/dummy-1");
    let mysql = state.service("mysql").unwrap();
    assert_eq!(mysql.charm_url(), charm.url());

    let err = state.add_service("mysql", &charm).unwrap_err();
    assert_eq!(err.kind(), &ErrorKind::AlreadyExists);
}

fn remove_service<S: DocStore>(state: &State<S>) {
    let charm = add_testing_charm(state, "dummy");
    let service = state.add_service("wordpress", &charm).unwrap();

    state.remove_service(&service).unwrap();
    let err = state.service("wordpress").unwrap_err();
    assert!(err.to_string().starts_with("can't get service \"wordpress\": "));

    // It has already been removed.
    let err = state.remove_service(&service).unwrap_err();
    assert!(err
        .to_string()
        .starts_with("can't remove service \"wordpress\": "));
}

fn read_non_existent_service<S: DocStore>(state: &State<S>) {
    let err = state.service("pressword").unwrap_err();
    assert_eq!(
        err.to_string(),
        "can't get service \"pressword\": not found"
    );
}

fn all_services<S: DocStore>(state: &State<S>) {
    let charm = add_testing_charm(state, "dummy");
    assert!(service_names(state).is_empty());

    state.add_service("wordpress", &charm).unwrap();
    assert_eq!(service_names(state), vec!["wordpress"]);

    state.add_service("mysql", &charm).unwrap();
    assert_eq!(service_names(state), vec!["mysql", "wordpress"]);
}

fn service_with_units_dies_then_goes<S: DocStore>(state: &State<S>) {
    let charm = add_testing_charm(state, "dummy");
    let service = state.add_service("wordpress", &charm).unwrap();
    let machine = state.add_machine().unwrap();
    let unit = state.add_unit(&service).unwrap();
    let unit = state.assign_to_machine(&unit, machine.id()).unwrap();

    state.remove_service(&service).unwrap();
    assert_eq!(state.service("wordpress").unwrap().life(), Life::Dying);
    assert!(matches!(
        state.remove_machine(machine.id()).unwrap_err().kind(),
        ErrorKind::InUse(_)
    ));

    state.remove_unit(&unit).unwrap();
    assert!(state.service("wordpress").unwrap_err().is_not_found());
    state.remove_machine(machine.id()).unwrap();
    assert!(machine_names(state).is_empty());
}
