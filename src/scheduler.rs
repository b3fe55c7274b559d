use futures::future;
use indexmap::IndexMap;
use rayon::prelude::*;

use crate::engine::Engine;
use crate::entity::{ComponentRecord, Entities};
use crate::error::{EngineError, Result};
use crate::resources::{ResourceMap, Resources};
use crate::systems::{RegisteredSystem, Stage, SystemQuery};

/// Everything a system receives when it runs.
pub struct Payload {
    /// Handle back to the engine, for spawning, stopping or changing level.
    pub engine: Engine,
    /// The system's declared resources, resolved across both stores.
    pub resources: ResourceMap,
    /// Query name -> matching entities. Empty when no queries were declared.
    pub components: IndexMap<String, Vec<ComponentRecord>>,
}

impl Payload {
    /// Records for one component query; empty if the query is unknown.
    pub fn query(&self, name: &str) -> &[ComponentRecord] {
        self.components.get(name).map(Vec::as_slice).unwrap_or_default()
    }
}

fn resolve(engine: &Engine, resources: &Resources, entities: &Entities, query: &SystemQuery) -> Payload {
    Payload {
        engine: engine.clone(),
        resources: resources.query_all(query.resources.as_slice()),
        components: query
            .components
            .iter()
            .map(|(name, components)| (name.clone(), entities.query(components.as_slice())))
            .collect(),
    }
}

/// Resolves the payload of every system in the batch from one snapshot.
pub(crate) fn build_payloads(
    engine: &Engine,
    resources: &Resources,
    entities: &Entities,
    batch: &[RegisteredSystem],
) -> Vec<Payload> {
    batch
        .par_iter()
        .map(|system| resolve(engine, resources, entities, &system.query))
        .collect()
}

/// Starts every system in the batch before awaiting any of them.
pub(crate) async fn dispatch(stage: Stage, batch: Vec<RegisteredSystem>, payloads: Vec<Payload>) -> Result<()> {
    log::debug!("running {:?} with {} system(s)", stage, batch.len());
    let started = batch.iter().zip(payloads).map(|(system, payload)| async move {
        let outcome = system.system.run(payload).await;
        (system.name().to_owned(), outcome)
    });
    let outcomes = future::join_all(started).await;
    settle(outcomes, |name, source| EngineError::SystemRun { name, source })
}

/// Turns the outcomes of a finished batch into one result.
///
/// Every failure is logged; the first one, in start order, is returned.
pub(crate) fn settle<F>(outcomes: Vec<(String, anyhow::Result<()>)>, wrap: F) -> Result<()>
where
    F: Fn(String, anyhow::Error) -> EngineError,
{
    let mut first = None;
    for (name, outcome) in outcomes {
        if let Err(source) = outcome {
            let err = wrap(name, source);
            match first {
                None => first = Some(err),
                Some(_) => log::error!("{:#}", anyhow::Error::new(err)),
            }
        }
    }
    match first {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
