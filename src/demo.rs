//! Demo site served by the `facet-server` binary.
//!
//! ```text
//! GET    /person/{name}          profile (JSON or text, cached 5s)
//! GET    /person/{name}/chores   chore list (JSON, cached 5s)
//! PUT    /person/{name}/chores   replace chores, invalidates the person
//! POST   /person/{name}/chores   append one chore (plain text body)
//! DELETE /person/{name}/chores   clear chores
//! GET    /person                 redirects to /person/
//! GET    /person/                names of all people
//! ```
//!
//! Every cached response for a person is tagged `person:{name}`, so any write
//! invalidates the profile and the chore list together.
//!
//! [`schedule_jobs`] registers an hourly chore summary with whatever
//! [`Scheduler`] the embedder runs.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use axum::http::StatusCode;
use serde::Serialize;
use time::OffsetDateTime;

use crate::error::{HookError, PatternError};
use crate::platform::{Job, Registry, RegistryError, ScheduleError, Scheduler};
use crate::rest::{CacheDuration, Context, Facet, Representation, Resource, Response};
use crate::routing::{Handler, Router};

/// Name of the people store in the registry.
pub const PEOPLE: &str = "demo.people";

/// Cron pattern of the chore summary job.
pub const SUMMARY_CRON: &str = "0 * * * *";

const TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize)]
pub struct Person {
    pub name: String,
    pub chores: Vec<String>,
    #[serde(skip)]
    pub updated: OffsetDateTime,
}

/// In-memory people store shared by every request.
#[derive(Debug, Default)]
pub struct PeopleStore {
    people: RwLock<BTreeMap<String, Person>>,
}

impl PeopleStore {
    pub fn seeded() -> Self {
        let store = Self::default();
        store.set_chores("alice", vec!["dishes".into(), "laundry".into()]);
        store.set_chores("bob", vec!["groceries".into()]);
        store
    }

    pub fn get(&self, name: &str) -> Option<Person> {
        self.people.read().unwrap_or_else(PoisonError::into_inner).get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.people.read().unwrap_or_else(PoisonError::into_inner).keys().cloned().collect()
    }

    /// Number of people and of chores across all of them.
    pub fn summary(&self) -> (usize, usize) {
        let people = self.people.read().unwrap_or_else(PoisonError::into_inner);
        (people.len(), people.values().map(|p| p.chores.len()).sum())
    }

    pub fn set_chores(&self, name: &str, chores: Vec<String>) {
        self.update(name, |person| person.chores = chores);
    }

    pub fn add_chore(&self, name: &str, chore: String) {
        self.update(name, |person| person.chores.push(chore));
    }

    fn update<F: FnOnce(&mut Person)>(&self, name: &str, f: F) {
        let mut people = self.people.write().unwrap_or_else(PoisonError::into_inner);
        let person = people.entry(name.to_string()).or_insert_with(|| Person {
            name: name.to_string(),
            chores: Vec::new(),
            updated: OffsetDateTime::now_utc(),
        });
        f(person);
        person.updated = OffsetDateTime::now_utc();
    }
}

/// Errors building the demo site.
#[derive(Debug, thiserror::Error)]
pub enum DemoError {
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

/// Register the demo's recurring jobs: an hourly log line counting open chores.
pub fn schedule_jobs(scheduler: &dyn Scheduler, registry: &Registry) -> Result<(), DemoError> {
    let store = registry.get_or_init(PEOPLE, PeopleStore::seeded)?;
    let job: Job = Arc::new(move || {
        let (people, chores) = store.summary();
        tracing::info!(people, chores, "Chore summary");
    });
    scheduler.schedule(SUMMARY_CRON, job)?;
    Ok(())
}

/// Build the demo handler tree, sharing the people store through `registry`.
pub fn site(registry: &Registry) -> Result<Handler, DemoError> {
    let store = registry.get_or_init(PEOPLE, PeopleStore::seeded)?;

    let person = Resource::new("person")
        .facet("{name}/chores", chores_facet(&store))?
        .facet("{name}", profile_facet(&store))?;

    let directory = {
        let store = store.clone();
        Facet::new("directory").representation(
            Representation::new()
                .content_types(["application/json"])
                .present(move |ctx| ctx.write_json(&store.names())),
        )
    };

    let root = Router::new("demo")
        .route("person//", Handler::Facet(Arc::new(directory)))?
        .route("person/*", Handler::Resource(Arc::new(person)))?;
    Ok(Handler::Router(Arc::new(root)))
}

fn person_name(ctx: &Context) -> String {
    ctx.variable_str("name").unwrap_or_default().to_string()
}

fn group(name: &str) -> String {
    format!("person:{}", name)
}

/// Cache directives shared by every representation of a person.
fn construct_person(ctx: &mut Context) -> Result<(), HookError> {
    let name = person_name(ctx);
    ctx.cache_duration = CacheDuration::For(TTL);
    ctx.add_cache_group(group(&name));
    Ok(())
}

/// Load the person or commit a 404.
fn describe_person(store: &PeopleStore, ctx: &mut Context) -> Option<Person> {
    match store.get(&person_name(ctx)) {
        Some(person) => {
            ctx.set_timestamp(person.updated);
            Some(person)
        }
        None => {
            ctx.response = Response::with_status(StatusCode::NOT_FOUND, "No such person");
            ctx.done = true;
            None
        }
    }
}

fn profile_facet(store: &Arc<PeopleStore>) -> Facet {
    let json = {
        let (describe_store, present_store) = (store.clone(), store.clone());
        Representation::new()
            .content_types(["application/json"])
            .construct(construct_person)
            .describe(move |ctx| {
                describe_person(&describe_store, ctx);
                Ok(())
            })
            .present(move |ctx| match present_store.get(&person_name(ctx)) {
                Some(person) => ctx.write_json(&person),
                None => Err(HookError::msg("person vanished between describe and present")),
            })
    };

    let text = {
        let store = store.clone();
        Representation::new()
            .content_types(["text/plain"])
            .construct(construct_person)
            .present(move |ctx| {
                if let Some(person) = describe_person(&store, ctx) {
                    let body = format!("{} has {} chores\n", person.name, person.chores.len());
                    ctx.write_str(&body);
                }
                Ok(())
            })
    };

    Facet::new("profile").representation(json).representation(text)
}

fn chores_facet(store: &Arc<PeopleStore>) -> Facet {
    let (present_store, modify_store, call_store, erase_store) =
        (store.clone(), store.clone(), store.clone(), store.clone());

    let json = Representation::new()
        .content_types(["application/json"])
        .construct(construct_person)
        .present(move |ctx| {
            if let Some(person) = describe_person(&present_store, ctx) {
                ctx.write_json(&person.chores)?;
            }
            Ok(())
        })
        .modify(move |ctx| {
            let chores: Vec<String> = serde_json::from_slice(&ctx.request.body)?;
            let name = person_name(ctx);
            modify_store.set_chores(&name, chores);
            ctx.invalidate_cache_group(&group(&name));
            ctx.response.status = StatusCode::NO_CONTENT;
            Ok(())
        })
        .call(move |ctx| {
            let chore = String::from_utf8_lossy(&ctx.request.body).trim().to_string();
            if chore.is_empty() {
                ctx.response = Response::with_status(StatusCode::BAD_REQUEST, "Empty chore");
                ctx.done = true;
                return Ok(());
            }
            let name = person_name(ctx);
            call_store.add_chore(&name, chore);
            ctx.invalidate_cache_group(&group(&name));
            ctx.response.status = StatusCode::CREATED;
            Ok(())
        })
        .erase(move |ctx| {
            let name = person_name(ctx);
            erase_store.set_chores(&name, Vec::new());
            ctx.invalidate_cache_group(&group(&name));
            ctx.response.status = StatusCode::NO_CONTENT;
            Ok(())
        });

    Facet::new("chores").representation(json)
}
