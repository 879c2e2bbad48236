//! Runtime dependency-graph recording.
//!
//! The [`CallGraphRecorder`] listens to service events and keeps every
//! `get`/`create` outcome together with the resolution context captured at
//! that moment. Dependencies are never declared: they are reconstructed
//! afterwards by walking each event's frames looking for the in-flight
//! lookup that caused it.
//!
//! Attribution is a heuristic. A locator-aware consumer found on the trace
//! is taken as the cause even when it was doing something unrelated at the
//! time, and lookups that happen outside any recorded frame are reported as
//! having no cause.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::events::{EventBus, EventHandler, HandlerId, ListenerAggregate, ServiceEvent, EVENT_CREATE, EVENT_GET};
use crate::instance::{Instance, ObjectId};
use crate::name::ServiceName;
use crate::registry::RegistrarRef;
use crate::trace::{CallFrame, FrameObject, RegistrarId};

/// Which registry operation produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verb {
    Get,
    Create,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "get",
            Verb::Create => "create",
        }
    }
}

/// One recorded `get` or `create`.
#[derive(Debug, Clone)]
pub struct InstantiationEvent {
    pub instance: Instance,
    pub registrar: RegistrarRef,
    pub requested_name: String,
    pub canonical_name: String,
    pub verb: Verb,
    /// Innermost frame first.
    pub trace: Vec<CallFrame>,
}

impl InstantiationEvent {
    pub fn new(registrar: RegistrarRef, instance: Instance, name: &ServiceName, verb: Verb) -> Self {
        Self {
            instance,
            registrar,
            requested_name: name.requested().to_string(),
            canonical_name: name.canonical().to_string(),
            verb,
            trace: Vec::new(),
        }
    }

    pub fn with_trace(mut self, trace: Vec<CallFrame>) -> Self {
        self.trace = trace;
        self
    }

    fn from_service_event(event: &ServiceEvent, verb: Verb) -> Self {
        Self {
            instance: event.instance().clone(),
            registrar: event.registrar().clone(),
            requested_name: event.requested_name().to_string(),
            canonical_name: event.canonical_name().to_string(),
            verb,
            trace: event.trace().to_vec(),
        }
    }
}

/// Per canonical name view of the recorded graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSummary {
    pub requested_names: BTreeSet<String>,
    pub access_count: usize,
    pub dependants: BTreeSet<String>,
    pub dependencies: BTreeSet<String>,
}

/// Per instance view of the recorded graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedService {
    pub id: ObjectId,
    pub canonical_name: String,
    /// Every name the instance was retrieved under.
    pub names: BTreeSet<String>,
    pub accesses: usize,
    /// 1-based position among the distinct instances of the same canonical name.
    pub instantiation_index: usize,
    pub registrar: RegistrarId,
    pub dependencies: Vec<ObjectId>,
    pub depending: Vec<ObjectId>,
}

/// Append-only log of service events with graph queries on top.
///
/// Clones share the same log.
///
/// # Examples
///
/// ```
/// use lazy_locator::{instrument, CallGraphRecorder, EventManager, Instance, ListenerAggregate, ServiceRegistry};
/// use std::sync::Arc;
///
/// struct Db;
/// struct Repo;
///
/// let registry = ServiceRegistry::new();
/// let bus = Arc::new(EventManager::new());
/// instrument(&registry, bus.clone());
/// let recorder = CallGraphRecorder::new();
/// recorder.attach(bus.as_ref());
///
/// registry.set_factory("db", |_| Ok(Instance::object(Db))).unwrap();
/// registry.set_factory("repo", |ctx| {
///     ctx.get("db")?;
///     Ok(Instance::object(Repo))
/// }).unwrap();
/// registry.get("repo").unwrap();
///
/// assert!(recorder.dependencies_of("repo").contains("db"));
/// assert!(recorder.dependants_of("db").unwrap().contains("repo"));
/// ```
#[derive(Clone, Default)]
pub struct CallGraphRecorder {
    inner: Arc<RecorderInner>,
}

#[derive(Default)]
struct RecorderInner {
    events: RwLock<Vec<Arc<InstantiationEvent>>>,
    handlers: Mutex<Vec<HandlerId>>,
}

impl fmt::Debug for CallGraphRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallGraphRecorder")
            .field("events", &self.len())
            .finish()
    }
}

impl CallGraphRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `event`. Values without identity are not recorded and yield
    /// `None`.
    pub fn record(&self, event: InstantiationEvent) -> Option<Arc<InstantiationEvent>> {
        if !event.instance.is_object() {
            return None;
        }
        trace!(
            service = %event.canonical_name,
            verb = event.verb.as_str(),
            frames = event.trace.len(),
            "recording service event"
        );
        let event = Arc::new(event);
        self.inner.events.write().push(event.clone());
        Some(event)
    }

    pub fn log_get(&self, event: &ServiceEvent) -> Option<Arc<InstantiationEvent>> {
        self.record(InstantiationEvent::from_service_event(event, Verb::Get))
    }

    pub fn log_create(&self, event: &ServiceEvent) -> Option<Arc<InstantiationEvent>> {
        self.record(InstantiationEvent::from_service_event(event, Verb::Create))
    }

    /// Recorded events in order.
    pub fn events(&self) -> Vec<Arc<InstantiationEvent>> {
        self.inner.events.read().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.events.read().is_empty()
    }

    /// Canonical name of the service whose lookup caused `event`, if any.
    pub fn find_causing_service(&self, event: &InstantiationEvent) -> Option<String> {
        let events = self.events();
        cause_of(&events, event).map(|i| events[i].canonical_name.clone())
    }

    /// Services that caused `canonical_name` to be resolved. `None` when
    /// nothing was recorded under that name.
    pub fn dependants_of(&self, canonical_name: &str) -> Option<BTreeSet<String>> {
        Graph::build(self.events()).dependants_of(canonical_name)
    }

    /// Services whose resolution was caused by `canonical_name`.
    pub fn dependencies_of(&self, canonical_name: &str) -> BTreeSet<String> {
        Graph::build(self.events()).dependencies_of(canonical_name)
    }

    pub fn summary(&self) -> BTreeMap<String, ServiceSummary> {
        let graph = Graph::build(self.events());
        let mut summary: BTreeMap<String, ServiceSummary> = BTreeMap::new();

        for event in &graph.events {
            let entry = summary.entry(event.canonical_name.clone()).or_default();
            entry.requested_names.insert(event.requested_name.clone());
            entry.access_count += 1;
        }
        for (name, entry) in summary.iter_mut() {
            entry.dependants = graph.dependants_of(name).unwrap_or_default();
            entry.dependencies = graph.dependencies_of(name);
        }
        summary
    }

    /// Events of the instances that caused `instance` to be resolved, one
    /// per distinct instance.
    pub fn depending_instances(&self, instance: ObjectId) -> Vec<Arc<InstantiationEvent>> {
        let graph = Graph::build(self.events());
        graph
            .depending_indices(instance)
            .into_iter()
            .map(|i| graph.events[i].clone())
            .collect()
    }

    /// Events of the instances whose resolution `instance` caused, one per
    /// distinct instance.
    pub fn dependency_instances(&self, instance: ObjectId) -> Vec<Arc<InstantiationEvent>> {
        let graph = Graph::build(self.events());
        graph
            .dependency_indices(instance)
            .into_iter()
            .map(|i| graph.events[i].clone())
            .collect()
    }

    /// One entry per distinct recorded instance, in first-seen order.
    pub fn logged_services(&self) -> Vec<LoggedService> {
        let graph = Graph::build(self.events());
        let mut services: Vec<LoggedService> = Vec::new();
        let mut positions: HashMap<ObjectId, usize> = HashMap::new();
        let mut per_name: HashMap<&str, usize> = HashMap::new();

        for event in &graph.events {
            let id = event.instance.id();
            let position = match positions.get(&id) {
                Some(&position) => position,
                None => {
                    let index = per_name.entry(event.canonical_name.as_str()).or_insert(0);
                    *index += 1;
                    services.push(LoggedService {
                        id,
                        canonical_name: event.canonical_name.clone(),
                        names: BTreeSet::new(),
                        accesses: 0,
                        instantiation_index: *index,
                        registrar: event.registrar.id,
                        dependencies: graph.instance_ids(graph.dependency_indices(id)),
                        depending: graph.instance_ids(graph.depending_indices(id)),
                    });
                    positions.insert(id, services.len() - 1);
                    services.len() - 1
                }
            };
            let service = &mut services[position];
            service.names.insert(event.requested_name.clone());
            service.accesses += 1;
        }
        services
    }

    /// Registries that produced recorded events, by id, with their labels.
    pub fn logged_registrars(&self) -> BTreeMap<RegistrarId, String> {
        self.inner
            .events
            .read()
            .iter()
            .map(|e| (e.registrar.id, e.registrar.label.clone()))
            .collect()
    }
}

impl ListenerAggregate for CallGraphRecorder {
    /// Attaches to both [`EVENT_GET`] and [`EVENT_CREATE`].
    fn attach(&self, bus: &dyn EventBus) {
        let recorder = self.clone();
        let on_get: EventHandler = Arc::new(move |event: &ServiceEvent| {
            recorder.log_get(event);
        });
        let recorder = self.clone();
        let on_create: EventHandler = Arc::new(move |event: &ServiceEvent| {
            recorder.log_create(event);
        });

        let mut handlers = self.inner.handlers.lock();
        handlers.push(bus.attach(EVENT_GET, on_get));
        handlers.push(bus.attach(EVENT_CREATE, on_create));
    }

    fn detach(&self, bus: &dyn EventBus) {
        self.inner.handlers.lock().retain(|id| !bus.detach(*id));
    }
}

/// Cause of every recorded event, computed once per query.
struct Graph {
    events: Vec<Arc<InstantiationEvent>>,
    causes: Vec<Option<usize>>,
}

impl Graph {
    fn build(events: Vec<Arc<InstantiationEvent>>) -> Self {
        let causes = events.iter().map(|e| cause_of(&events, e)).collect();
        Self { events, causes }
    }

    fn dependants_of(&self, canonical_name: &str) -> Option<BTreeSet<String>> {
        let mut seen = false;
        let mut dependants = BTreeSet::new();
        for (event, cause) in self.events.iter().zip(&self.causes) {
            if event.canonical_name != canonical_name {
                continue;
            }
            seen = true;
            if let Some(cause) = cause {
                dependants.insert(self.events[*cause].canonical_name.clone());
            }
        }
        seen.then_some(dependants)
    }

    fn dependencies_of(&self, canonical_name: &str) -> BTreeSet<String> {
        self.events
            .iter()
            .zip(&self.causes)
            .filter_map(|(event, cause)| {
                let cause = (*cause)?;
                (self.events[cause].canonical_name == canonical_name).then(|| event.canonical_name.clone())
            })
            .collect()
    }

    fn depending_indices(&self, instance: ObjectId) -> Vec<usize> {
        let mut seen = HashSet::new();
        self.events
            .iter()
            .zip(&self.causes)
            .filter(|(event, _)| event.instance.id() == instance)
            .filter_map(|(_, cause)| *cause)
            .filter(|&cause| seen.insert(self.events[cause].instance.id()))
            .collect()
    }

    fn dependency_indices(&self, instance: ObjectId) -> Vec<usize> {
        let mut seen = HashSet::new();
        self.events
            .iter()
            .enumerate()
            .filter(|(_, event)| seen.insert(event.instance.id()))
            .filter(|(_, event)| {
                self.depending_indices(event.instance.id())
                    .into_iter()
                    .any(|cause| self.events[cause].instance.id() == instance)
            })
            .map(|(i, _)| i)
            .collect()
    }

    fn instance_ids(&self, indices: Vec<usize>) -> Vec<ObjectId> {
        indices.into_iter().map(|i| self.events[i].instance.id()).collect()
    }
}

/// Index of the recorded event that caused `event`.
///
/// Frames are walked innermost first. A locator-aware consumer frame yields
/// the event that recorded that consumer. A `get`/`create` frame of the
/// event's own registry yields the first event recorded for the name that
/// frame was looking up, unless that name is the event's own.
fn cause_of(events: &[Arc<InstantiationEvent>], event: &InstantiationEvent) -> Option<usize> {
    for frame in &event.trace {
        match &frame.object {
            None => continue,
            Some(FrameObject::Consumer { id, locator_aware }) => {
                if !locator_aware {
                    continue;
                }
                if let Some(found) = events.iter().position(|e| e.instance.id() == *id) {
                    return Some(found);
                }
            }
            Some(FrameObject::Registrar(registrar)) => {
                if *registrar != event.registrar.id {
                    continue;
                }
                let function = frame.function.to_lowercase();
                if function != "get" && function != "create" {
                    continue;
                }
                let Some(arg) = frame.args.first() else {
                    continue;
                };
                let Some(requested) = arg.requested() else {
                    continue;
                };
                // the frame that produced this very event
                if requested == event.requested_name || arg.canonical().as_deref() == Some(event.canonical_name.as_str()) {
                    continue;
                }
                if let Some(found) = events
                    .iter()
                    .position(|e| e.registrar.id == *registrar && e.requested_name == requested)
                {
                    return Some(found);
                }
            }
        }
    }
    None
}
