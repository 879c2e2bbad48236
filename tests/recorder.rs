/// Call-graph recorder tests
///
/// Traces are built by hand here so every attribution rule can be exercised
/// without a live registry; end_to_end.rs covers the recorded traces.

use lazy_locator::events::{EventManager, ServiceEvent, EVENT_CREATE, EVENT_GET};
use lazy_locator::trace::{CallArg, CallFrame, RegistrarId};
use lazy_locator::{
    CallGraphRecorder, Instance, InstantiationEvent, ListenerAggregate, RegistrarRef, ServiceName, Verb,
};
use std::collections::BTreeSet;
use std::sync::Arc;

// ===== Helpers =====

struct Stub;

fn locator(id: u64) -> RegistrarRef {
    RegistrarRef {
        id: RegistrarId::from_raw(id),
        label: format!("Locator{}", id),
    }
}

fn get(locator: u64, requested: &str) -> CallFrame {
    CallFrame::registrar(RegistrarId::from_raw(locator), "get", requested)
}

fn create_pair(locator: u64, canonical: &str, requested: &str) -> CallFrame {
    CallFrame::registrar(
        RegistrarId::from_raw(locator),
        "create",
        CallArg::Pair(canonical.to_string(), requested.to_string()),
    )
}

fn register(
    recorder: &CallGraphRecorder,
    locator_id: u64,
    instance: &Instance,
    canonical: &str,
    requested: &str,
    trace: Vec<CallFrame>,
) -> Option<Arc<InstantiationEvent>> {
    recorder.record(
        InstantiationEvent::new(
            locator(locator_id),
            instance.clone(),
            &ServiceName::pair(canonical, requested),
            Verb::Create,
        )
        .with_trace(trace),
    )
}

fn names(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// dependency2 is built while dependency1 is being created, which in turn
/// happens while instance is being fetched.
struct Chain {
    recorder: CallGraphRecorder,
    dependency2: Instance,
    dependency1: Instance,
    instance: Instance,
}

fn chain() -> Chain {
    let recorder = CallGraphRecorder::new();
    let dependency2 = Instance::object(Stub);
    let dependency1 = Instance::object(Stub);
    let instance = Instance::object(Stub);

    register(
        &recorder,
        1,
        &dependency2,
        "dependency2-canonical-name",
        "dependency2\\requested\\name",
        vec![
            get(1, "dependency2\\requested\\name"),
            create_pair(1, "dependency1-canonical-name", "dependency1\\requested\\name"),
            get(1, "instance\\requested\\name"),
        ],
    );
    register(
        &recorder,
        1,
        &dependency1,
        "dependency1-canonical-name",
        "dependency1\\requested\\name",
        vec![
            get(1, "dependency1\\requested\\name"),
            get(1, "instance\\requested\\name"),
        ],
    );
    register(
        &recorder,
        1,
        &instance,
        "instance-canonical-name",
        "instance\\requested\\name",
        vec![get(1, "instance\\requested\\name")],
    );

    Chain {
        recorder,
        dependency2,
        dependency1,
        instance,
    }
}

// ===== Recording =====

#[test]
fn test_attach_and_detach_track_their_own_bus() {
    let recorder = CallGraphRecorder::new();
    let bus = EventManager::new();
    let other = EventManager::new();

    recorder.attach(&bus);
    assert_eq!(bus.handler_count(EVENT_GET), 1);
    assert_eq!(bus.handler_count(EVENT_CREATE), 1);

    recorder.detach(&other);
    assert_eq!(bus.handler_count(EVENT_GET), 1);

    recorder.detach(&bus);
    assert_eq!(bus.handler_count(EVENT_GET), 0);
    assert_eq!(bus.handler_count(EVENT_CREATE), 0);
}

#[test]
fn test_log_get_and_log_create_copy_the_event() {
    let recorder = CallGraphRecorder::new();
    let instance = Instance::object(Stub);
    let event = ServiceEvent::new(
        EVENT_GET,
        locator(1),
        instance.clone(),
        &ServiceName::pair("canonical-name", "requested\\name"),
    )
    .with_trace(Vec::new());

    let got = recorder.log_get(&event).unwrap();
    assert!(got.instance.ptr_eq(&instance));
    assert_eq!(got.registrar, locator(1));
    assert_eq!(got.requested_name, "requested\\name");
    assert_eq!(got.canonical_name, "canonical-name");
    assert_eq!(got.verb, Verb::Get);
    assert!(got.trace.is_empty());

    let created = recorder.log_create(&event).unwrap();
    assert_eq!(created.verb, Verb::Create);
    assert_eq!(created.verb.as_str(), "create");
    assert_eq!(recorder.len(), 2);
}

#[test]
fn test_values_are_not_recorded() {
    let recorder = CallGraphRecorder::new();
    let recorded = register(
        &recorder,
        1,
        &Instance::value(42u32),
        "canonical-name",
        "requested\\name",
        Vec::new(),
    );

    assert!(recorded.is_none());
    assert!(recorder.is_empty());
}

#[test]
fn test_unknown_service_queries_are_empty() {
    let recorder = CallGraphRecorder::new();

    assert_eq!(recorder.dependants_of("non-existing-service"), None);
    assert!(recorder.dependencies_of("non-existing-service").is_empty());

    let stranger = Instance::object(Stub);
    assert!(recorder.depending_instances(stranger.id()).is_empty());
    assert!(recorder.dependency_instances(stranger.id()).is_empty());
}

// ===== Instance graph =====

#[test]
fn test_depending_instances_follow_the_chain() {
    let Chain {
        recorder,
        dependency2,
        dependency1,
        instance,
    } = chain();

    let depending1 = recorder.depending_instances(dependency1.id());
    assert_eq!(depending1.len(), 1);
    assert!(depending1[0].instance.ptr_eq(&instance));

    let depending2 = recorder.depending_instances(dependency2.id());
    assert_eq!(depending2.len(), 1);
    assert!(depending2[0].instance.ptr_eq(&dependency1));

    assert!(recorder.depending_instances(instance.id()).is_empty());

    let dependencies1 = recorder.dependency_instances(instance.id());
    assert_eq!(dependencies1.len(), 1);
    assert!(dependencies1[0].instance.ptr_eq(&dependency1));

    let dependencies2 = recorder.dependency_instances(dependency1.id());
    assert_eq!(dependencies2.len(), 1);
    assert!(dependencies2[0].instance.ptr_eq(&dependency2));

    assert!(recorder.dependency_instances(dependency2.id()).is_empty());

    let registrars = recorder.logged_registrars();
    assert_eq!(registrars.len(), 1);
    assert_eq!(registrars.get(&RegistrarId::from_raw(1)).map(String::as_str), Some("Locator1"));
}

#[test]
fn test_multiple_locators_are_kept_apart() {
    let recorder = CallGraphRecorder::new();
    let dependency1 = Instance::object(Stub);
    let instance1 = Instance::object(Stub);
    let dependency2 = Instance::object(Stub);
    let instance2 = Instance::object(Stub);

    register(
        &recorder,
        1,
        &dependency1,
        "dependency-canonical-name",
        "dependency\\requested\\name",
        vec![get(1, "dependency\\requested\\name"), get(1, "instance\\requested\\name")],
    );
    register(
        &recorder,
        1,
        &instance1,
        "instance-canonical-name",
        "instance\\requested\\name",
        vec![get(1, "instance\\requested\\name")],
    );
    register(
        &recorder,
        2,
        &dependency2,
        "dependency-canonical-name",
        "dependency\\requested\\name",
        vec![get(2, "dependency\\requested\\name"), get(2, "instance\\requested\\name")],
    );
    // a frame of the first locator says nothing about the second one's events
    register(
        &recorder,
        2,
        &instance2,
        "instance-canonical-name",
        "instance\\requested\\name",
        vec![get(1, "instance\\requested\\name")],
    );

    let depending1 = recorder.depending_instances(dependency1.id());
    assert_eq!(depending1.len(), 1);
    assert!(depending1[0].instance.ptr_eq(&instance1));
    assert!(recorder.depending_instances(instance1.id()).is_empty());

    let dependencies1 = recorder.dependency_instances(instance1.id());
    assert_eq!(dependencies1.len(), 1);
    assert!(dependencies1[0].instance.ptr_eq(&dependency1));
    assert!(recorder.dependency_instances(dependency1.id()).is_empty());

    let depending2 = recorder.depending_instances(dependency2.id());
    assert_eq!(depending2.len(), 1);
    assert!(depending2[0].instance.ptr_eq(&instance2));
    assert!(recorder.depending_instances(instance2.id()).is_empty());

    let dependencies2 = recorder.dependency_instances(instance2.id());
    assert_eq!(dependencies2.len(), 1);
    assert!(dependencies2[0].instance.ptr_eq(&dependency2));
    assert!(recorder.dependency_instances(dependency2.id()).is_empty());

    assert_eq!(recorder.logged_registrars().len(), 2);
}

#[test]
fn test_repeated_accesses_are_deduplicated_per_instance() {
    let Chain {
        recorder,
        dependency1,
        instance,
        ..
    } = chain();

    // a later cached get of dependency1, again while instance is in flight
    recorder.record(
        InstantiationEvent::new(
            locator(1),
            dependency1.clone(),
            &ServiceName::pair("dependency1-canonical-name", "dependency1\\requested\\name"),
            Verb::Get,
        )
        .with_trace(vec![
            get(1, "dependency1\\requested\\name"),
            get(1, "instance\\requested\\name"),
        ]),
    );

    assert_eq!(recorder.depending_instances(dependency1.id()).len(), 1);
    assert_eq!(recorder.dependency_instances(instance.id()).len(), 1);
}

// ===== Name graph =====

#[test]
fn test_depending_and_dependencies_by_name() {
    let Chain { recorder, .. } = chain();

    assert_eq!(
        recorder.dependants_of("dependency1-canonical-name"),
        Some(names(&["instance-canonical-name"]))
    );
    assert_eq!(
        recorder.dependants_of("dependency2-canonical-name"),
        Some(names(&["dependency1-canonical-name"]))
    );
    assert_eq!(recorder.dependants_of("instance-canonical-name"), Some(BTreeSet::new()));

    assert_eq!(
        recorder.dependencies_of("instance-canonical-name"),
        names(&["dependency1-canonical-name"])
    );
    assert_eq!(
        recorder.dependencies_of("dependency1-canonical-name"),
        names(&["dependency2-canonical-name"])
    );
    assert!(recorder.dependencies_of("dependency2-canonical-name").is_empty());
}

#[test]
fn test_find_causing_service() {
    let recorder = CallGraphRecorder::new();
    register(
        &recorder,
        1,
        &Instance::object(Stub),
        "instance-canonical-name",
        "instance\\requested\\name",
        vec![get(1, "instance\\requested\\name")],
    );
    let dependency = register(
        &recorder,
        1,
        &Instance::object(Stub),
        "dependency-canonical-name",
        "dependency\\requested\\name",
        vec![get(1, "dependency\\requested\\name"), get(1, "instance\\requested\\name")],
    )
    .unwrap();
    let root = recorder.events()[0].clone();

    assert_eq!(
        recorder.find_causing_service(&dependency).as_deref(),
        Some("instance-canonical-name")
    );
    assert_eq!(recorder.find_causing_service(&root), None);
}

// ===== Locator-aware consumers =====

fn locator_aware() -> (CallGraphRecorder, Instance, Instance) {
    let recorder = CallGraphRecorder::new();
    let aware = Instance::object(Stub);
    let dependency = Instance::object(Stub);

    register(
        &recorder,
        1,
        &dependency,
        "dependency-canonical-name",
        "dependency\\requested\\name",
        vec![
            CallFrame::consumer(aware.id(), true, "create_dependency").with_args(vec![CallArg::from(
                "dependency\\requested\\name",
            )]),
            get(1, "instance\\requested\\name"),
        ],
    );
    register(
        &recorder,
        1,
        &aware,
        "instance-canonical-name",
        "instance\\requested\\name",
        vec![get(1, "instance\\requested\\name")],
    );

    (recorder, aware, dependency)
}

#[test]
fn test_locator_aware_consumer_is_the_cause() {
    let (recorder, aware, dependency) = locator_aware();

    let depending = recorder.depending_instances(dependency.id());
    assert_eq!(depending.len(), 1);
    assert!(depending[0].instance.ptr_eq(&aware));
    assert!(recorder.depending_instances(aware.id()).is_empty());

    let dependencies = recorder.dependency_instances(aware.id());
    assert_eq!(dependencies.len(), 1);
    assert!(dependencies[0].instance.ptr_eq(&dependency));
    assert!(recorder.dependency_instances(dependency.id()).is_empty());
}

#[test]
fn test_locator_aware_consumer_by_name() {
    let (recorder, _, _) = locator_aware();

    assert_eq!(
        recorder.dependants_of("dependency-canonical-name"),
        Some(names(&["instance-canonical-name"]))
    );
    assert_eq!(recorder.dependants_of("instance-canonical-name"), Some(BTreeSet::new()));
    assert_eq!(
        recorder.dependencies_of("instance-canonical-name"),
        names(&["dependency-canonical-name"])
    );
    assert!(recorder.dependencies_of("dependency-canonical-name").is_empty());
}

#[test]
fn test_plain_consumers_are_skipped() {
    let recorder = CallGraphRecorder::new();
    let consumer = Instance::object(Stub);
    register(
        &recorder,
        1,
        &consumer,
        "consumer",
        "consumer",
        vec![get(1, "consumer")],
    );
    let dependency = register(
        &recorder,
        1,
        &Instance::object(Stub),
        "dependency",
        "dependency",
        vec![CallFrame::consumer(consumer.id(), false, "work"), get(1, "dependency")],
    )
    .unwrap();

    assert_eq!(recorder.find_causing_service(&dependency), None);
}

// ===== Unrelated frames =====

fn with_noise() -> (CallGraphRecorder, Instance, Instance) {
    let recorder = CallGraphRecorder::new();
    let instance = Instance::object(Stub);
    let dependency = Instance::object(Stub);

    register(
        &recorder,
        1,
        &dependency,
        "dependency-canonical-name",
        "dependency\\requested\\name",
        vec![
            get(1, "dependency\\requested\\name"),
            CallFrame::registrar(RegistrarId::from_raw(1), "other_locator_method", CallArg::Other).with_args(Vec::new()),
            CallFrame::free("do_stuff"),
            get(1, "instance\\requested\\name"),
        ],
    );
    register(
        &recorder,
        1,
        &instance,
        "instance-canonical-name",
        "instance\\requested\\name",
        vec![get(1, "instance\\requested\\name")],
    );

    (recorder, instance, dependency)
}

#[test]
fn test_unrelated_frames_are_ignored_for_instances() {
    let (recorder, instance, dependency) = with_noise();

    let depending = recorder.depending_instances(dependency.id());
    assert_eq!(depending.len(), 1);
    assert!(depending[0].instance.ptr_eq(&instance));
    assert!(recorder.depending_instances(instance.id()).is_empty());

    let dependencies = recorder.dependency_instances(instance.id());
    assert_eq!(dependencies.len(), 1);
    assert!(dependencies[0].instance.ptr_eq(&dependency));
    assert!(recorder.dependency_instances(dependency.id()).is_empty());
}

#[test]
fn test_unrelated_frames_are_ignored_for_names() {
    let (recorder, _, _) = with_noise();

    assert_eq!(
        recorder.dependants_of("dependency-canonical-name"),
        Some(names(&["instance-canonical-name"]))
    );
    assert_eq!(
        recorder.dependencies_of("instance-canonical-name"),
        names(&["dependency-canonical-name"])
    );
}

#[test]
fn test_function_names_match_case_insensitively() {
    let recorder = CallGraphRecorder::new();
    register(&recorder, 1, &Instance::object(Stub), "parent", "parent", vec![get(1, "parent")]);
    let child = register(
        &recorder,
        1,
        &Instance::object(Stub),
        "child",
        "child",
        vec![
            CallFrame::registrar(RegistrarId::from_raw(1), "GET", "child"),
            CallFrame::registrar(RegistrarId::from_raw(1), "Create", "parent"),
        ],
    )
    .unwrap();

    assert_eq!(recorder.find_causing_service(&child).as_deref(), Some("parent"));
}

// ===== Views =====

#[test]
fn test_logged_services_in_first_seen_order() {
    let Chain {
        recorder,
        dependency2,
        dependency1,
        instance,
    } = chain();
    let second_instance = Instance::object(Stub);
    register(
        &recorder,
        1,
        &second_instance,
        "instance-canonical-name",
        "Instance",
        Vec::new(),
    );

    let services = recorder.logged_services();
    let ids: Vec<_> = services.iter().map(|s| s.id).collect();
    assert_eq!(
        ids,
        vec![dependency2.id(), dependency1.id(), instance.id(), second_instance.id()]
    );

    let middle = &services[1];
    assert_eq!(middle.canonical_name, "dependency1-canonical-name");
    assert_eq!(middle.names, names(&["dependency1\\requested\\name"]));
    assert_eq!(middle.accesses, 1);
    assert_eq!(middle.instantiation_index, 1);
    assert_eq!(middle.registrar, RegistrarId::from_raw(1));
    assert_eq!(middle.dependencies, vec![dependency2.id()]);
    assert_eq!(middle.depending, vec![instance.id()]);

    assert_eq!(services[2].instantiation_index, 1);
    assert_eq!(services[3].instantiation_index, 2);
}

#[test]
fn test_summary_collects_names_counts_and_edges() {
    let Chain { recorder, instance, .. } = chain();
    recorder.record(InstantiationEvent::new(
        locator(1),
        instance,
        &ServiceName::pair("instance-canonical-name", "Instance"),
        Verb::Get,
    ));

    let summary = recorder.summary();
    assert_eq!(summary.len(), 3);

    let root = &summary["instance-canonical-name"];
    assert_eq!(root.access_count, 2);
    assert_eq!(root.requested_names, names(&["Instance", "instance\\requested\\name"]));
    assert!(root.dependants.is_empty());
    assert_eq!(root.dependencies, names(&["dependency1-canonical-name"]));

    let leaf = &summary["dependency2-canonical-name"];
    assert_eq!(leaf.dependants, names(&["dependency1-canonical-name"]));
    assert!(leaf.dependencies.is_empty());
}

#[test]
fn test_clones_share_the_log() {
    let recorder = CallGraphRecorder::new();
    let clone = recorder.clone();
    register(&clone, 1, &Instance::object(Stub), "svc", "svc", Vec::new());

    assert_eq!(recorder.len(), 1);
    assert_eq!(recorder.events()[0].canonical_name, "svc");
}
