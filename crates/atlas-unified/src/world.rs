//! Entity and relationship graph with prediction, counterfactuals, and
//! mental simulation
//!
//! Adjacency is stored two-sided: a global relationship list plus id
//! lists on both endpoints. Removing an entity purges every edge that
//! touches it and every back-reference.

use crate::types::{clamp_unit, round3, EntityRelationship, EntityType, WorldEntity};
use atlas_common::{Error, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

/// Baseline forward projection of an entity's state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatePrediction {
    pub entity_id: Uuid,
    pub current_state: String,
    pub predicted_state: String,
    pub time_steps: u32,
    pub confidence: f64,
    pub related_states: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// One entity affected by a hypothetical change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffectedEntity {
    pub entity_id: Uuid,
    pub name: String,
    pub current_state: String,
    pub relation_type: String,
    pub impact: f64,
}

/// Counterfactual analysis of a hypothetical entity state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterfactualAnalysis {
    pub entity_id: Uuid,
    pub actual_state: String,
    pub hypothetical_state: String,
    pub affected_entities: Vec<AffectedEntity>,
    pub total_impact: f64,
}

/// Result of simulating a scenario without mutating real state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    pub scenario: String,
    pub changes: HashMap<Uuid, String>,
    pub effects: Vec<CounterfactualAnalysis>,
    pub total_entities_affected: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorldSnapshot {
    snapshot_id: String,
    entities: HashMap<Uuid, WorldEntity>,
    relationship_count: usize,
    timestamp: DateTime<Utc>,
}

struct Inner {
    entities: HashMap<Uuid, WorldEntity>,
    relationships: Vec<EntityRelationship>,
    predictions: Vec<StatePrediction>,
    simulations: Vec<SimulationResult>,
    snapshots: Vec<WorldSnapshot>,
}

/// World model of entities and relationships
pub struct WorldModel {
    inner: RwLock<Inner>,
}

impl Default for WorldModel {
    fn default() -> Self {
        Self::new()
    }
}

impl WorldModel {
    pub fn new() -> Self {
        info!("world model started");
        Self {
            inner: RwLock::new(Inner {
                entities: HashMap::new(),
                relationships: Vec::new(),
                predictions: Vec::new(),
                simulations: Vec::new(),
                snapshots: Vec::new(),
            }),
        }
    }

    /// Add an entity and return it
    pub fn add_entity(
        &self,
        name: impl Into<String>,
        entity_type: EntityType,
        state: impl Into<String>,
        properties: HashMap<String, Value>,
    ) -> WorldEntity {
        let entity = WorldEntity {
            entity_id: Uuid::new_v4(),
            name: name.into(),
            entity_type,
            state: state.into(),
            properties,
            relationships: Vec::new(),
            last_updated: Utc::now(),
        };
        self.inner
            .write()
            .entities
            .insert(entity.entity_id, entity.clone());
        entity
    }

    /// Update an entity's state and/or merge new properties
    pub fn update_entity(
        &self,
        entity_id: Uuid,
        state: Option<String>,
        properties: Option<HashMap<String, Value>>,
    ) -> bool {
        let mut inner = self.inner.write();
        let Some(entity) = inner.entities.get_mut(&entity_id) else {
            return false;
        };
        if let Some(state) = state {
            entity.state = state;
        }
        if let Some(properties) = properties {
            entity.properties.extend(properties);
        }
        entity.last_updated = Utc::now();
        true
    }

    /// Remove an entity, purging every relationship that touches it and
    /// every back-reference on other entities
    pub fn remove_entity(&self, entity_id: Uuid) -> bool {
        let mut inner = self.inner.write();
        if inner.entities.remove(&entity_id).is_none() {
            return false;
        }
        inner
            .relationships
            .retain(|r| r.source != entity_id && r.target != entity_id);
        for entity in inner.entities.values_mut() {
            entity.relationships.retain(|id| *id != entity_id);
        }
        true
    }

    /// Add a relationship between two known entities; returns None when
    /// either endpoint is unknown. Both endpoints get a deduplicated
    /// back-reference.
    pub fn add_relationship(
        &self,
        source: Uuid,
        target: Uuid,
        relation_type: impl Into<String>,
        strength: f64,
        properties: HashMap<String, Value>,
    ) -> Option<EntityRelationship> {
        let mut inner = self.inner.write();
        if !inner.entities.contains_key(&source) || !inner.entities.contains_key(&target) {
            return None;
        }

        let relationship = EntityRelationship {
            source,
            target,
            relation_type: relation_type.into(),
            strength: clamp_unit(strength),
            properties,
        };
        inner.relationships.push(relationship.clone());

        if let Some(entity) = inner.entities.get_mut(&source) {
            if !entity.relationships.contains(&target) {
                entity.relationships.push(target);
            }
        }
        if let Some(entity) = inner.entities.get_mut(&target) {
            if !entity.relationships.contains(&source) {
                entity.relationships.push(source);
            }
        }
        Some(relationship)
    }

    /// Every relationship touching the entity
    pub fn relationships_of(&self, entity_id: Uuid) -> Vec<EntityRelationship> {
        self.inner
            .read()
            .relationships
            .iter()
            .filter(|r| r.source == entity_id || r.target == entity_id)
            .cloned()
            .collect()
    }

    /// Baseline state projection: the current state carried forward with
    /// confidence decaying 0.1 per step down to a 0.3 floor
    pub fn predict_state(&self, entity_id: Uuid, time_steps: u32) -> Result<StatePrediction> {
        let mut inner = self.inner.write();
        let entity = inner
            .entities
            .get(&entity_id)
            .ok_or_else(|| Error::NotFound(format!("unknown entity: {}", entity_id)))?
            .clone();

        let related_states: Vec<String> = inner
            .relationships
            .iter()
            .filter(|r| r.source == entity_id || r.target == entity_id)
            .filter_map(|r| {
                let other = if r.source == entity_id { r.target } else { r.source };
                inner.entities.get(&other).map(|e| e.state.clone())
            })
            .collect();

        let prediction = StatePrediction {
            entity_id,
            current_state: entity.state.clone(),
            // Stability assumption: absent a dynamics model the best
            // baseline is the current state
            predicted_state: entity.state,
            time_steps,
            confidence: round3((1.0 - 0.1 * time_steps as f64).max(0.3)),
            related_states,
            timestamp: Utc::now(),
        };
        inner.predictions.push(prediction.clone());
        Ok(prediction)
    }

    /// Enumerate the entities affected were the entity in a hypothetical
    /// state; impact equals relationship strength
    pub fn counterfactual(
        &self,
        entity_id: Uuid,
        hypothetical_state: impl Into<String>,
    ) -> Result<CounterfactualAnalysis> {
        let inner = self.inner.read();
        let entity = inner
            .entities
            .get(&entity_id)
            .ok_or_else(|| Error::NotFound(format!("unknown entity: {}", entity_id)))?;

        let mut affected = Vec::new();
        for relationship in inner
            .relationships
            .iter()
            .filter(|r| r.source == entity_id || r.target == entity_id)
        {
            let other_id = if relationship.source == entity_id {
                relationship.target
            } else {
                relationship.source
            };
            if let Some(other) = inner.entities.get(&other_id) {
                affected.push(AffectedEntity {
                    entity_id: other_id,
                    name: other.name.clone(),
                    current_state: other.state.clone(),
                    relation_type: relationship.relation_type.clone(),
                    impact: relationship.strength,
                });
            }
        }

        let total_impact = affected.iter().map(|a| a.impact).sum();
        Ok(CounterfactualAnalysis {
            entity_id,
            actual_state: entity.state.clone(),
            hypothetical_state: hypothetical_state.into(),
            affected_entities: affected,
            total_impact,
        })
    }

    /// Run a scenario of hypothetical state changes without mutating
    /// real state; unknown entities are skipped
    pub fn simulate(&self, scenario: impl Into<String>, changes: HashMap<Uuid, String>) -> SimulationResult {
        let mut effects = Vec::new();
        for (entity_id, new_state) in &changes {
            if let Ok(analysis) = self.counterfactual(*entity_id, new_state.clone()) {
                effects.push(analysis);
            }
        }

        let result = SimulationResult {
            scenario: scenario.into(),
            changes,
            total_entities_affected: effects.iter().map(|e| e.affected_entities.len()).sum(),
            effects,
            timestamp: Utc::now(),
        };
        self.inner.write().simulations.push(result.clone());
        result
    }

    /// Store an in-memory shallow copy of all entities, returning its id
    pub fn take_snapshot(&self) -> String {
        let mut inner = self.inner.write();
        let snapshot_id = format!("world-{}", inner.snapshots.len());
        let snapshot = WorldSnapshot {
            snapshot_id: snapshot_id.clone(),
            entities: inner.entities.clone(),
            relationship_count: inner.relationships.len(),
            timestamp: Utc::now(),
        };
        inner.snapshots.push(snapshot);
        snapshot_id
    }

    pub fn get_entity(&self, entity_id: Uuid) -> Option<WorldEntity> {
        self.inner.read().entities.get(&entity_id).cloned()
    }

    /// First entity with the given name, if any
    pub fn find_by_name(&self, name: &str) -> Option<WorldEntity> {
        self.inner
            .read()
            .entities
            .values()
            .find(|e| e.name == name)
            .cloned()
    }

    pub fn find_by_type(&self, entity_type: EntityType) -> Vec<WorldEntity> {
        self.inner
            .read()
            .entities
            .values()
            .filter(|e| e.entity_type == entity_type)
            .cloned()
            .collect()
    }

    pub fn find_by_state(&self, state: &str) -> Vec<WorldEntity> {
        self.inner
            .read()
            .entities
            .values()
            .filter(|e| e.state == state)
            .cloned()
            .collect()
    }

    pub fn entity_count(&self) -> usize {
        self.inner.read().entities.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.inner.read().relationships.len()
    }

    pub fn prediction_count(&self) -> usize {
        self.inner.read().predictions.len()
    }

    pub fn simulation_count(&self) -> usize {
        self.inner.read().simulations.len()
    }

    pub fn snapshot_count(&self) -> usize {
        self.inner.read().snapshots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_with_pair() -> (WorldModel, WorldEntity, WorldEntity) {
        let world = WorldModel::new();
        let api = world.add_entity("api", EntityType::System, "active", HashMap::new());
        let db = world.add_entity("db", EntityType::Resource, "active", HashMap::new());
        (world, api, db)
    }

    #[test]
    fn relationship_cross_references_both_endpoints() {
        let (world, api, db) = model_with_pair();
        let rel = world
            .add_relationship(api.entity_id, db.entity_id, "depends_on", 0.9, HashMap::new())
            .unwrap();
        assert_eq!(rel.relation_type, "depends_on");

        let api = world.get_entity(api.entity_id).unwrap();
        let db = world.get_entity(db.entity_id).unwrap();
        assert!(api.relationships.contains(&db.entity_id));
        assert!(db.relationships.contains(&api.entity_id));

        // A duplicate edge appends to the list but not the back-references
        world
            .add_relationship(api.entity_id, db.entity_id, "calls", 0.5, HashMap::new())
            .unwrap();
        assert_eq!(world.relationship_count(), 2);
        assert_eq!(world.get_entity(api.entity_id).unwrap().relationships.len(), 1);
    }

    #[test]
    fn relationship_with_unknown_endpoint_is_refused() {
        let (world, api, _) = model_with_pair();
        let ghost = Uuid::new_v4();
        assert!(world
            .add_relationship(api.entity_id, ghost, "uses", 0.5, HashMap::new())
            .is_none());
        assert_eq!(world.relationship_count(), 0);
    }

    #[test]
    fn remove_entity_purges_edges_and_back_references() {
        let (world, api, db) = model_with_pair();
        let cache = world.add_entity("cache", EntityType::Resource, "active", HashMap::new());
        world
            .add_relationship(api.entity_id, db.entity_id, "depends_on", 0.9, HashMap::new())
            .unwrap();
        world
            .add_relationship(db.entity_id, cache.entity_id, "feeds", 0.4, HashMap::new())
            .unwrap();

        assert!(world.remove_entity(db.entity_id));
        assert_eq!(world.relationship_count(), 0);
        assert!(world
            .get_entity(api.entity_id)
            .unwrap()
            .relationships
            .is_empty());
        assert!(world
            .get_entity(cache.entity_id)
            .unwrap()
            .relationships
            .is_empty());
        assert!(!world.remove_entity(db.entity_id));
    }

    #[test]
    fn prediction_confidence_decays_to_floor() {
        let (world, api, db) = model_with_pair();
        world
            .add_relationship(api.entity_id, db.entity_id, "depends_on", 0.9, HashMap::new())
            .unwrap();

        let near = world.predict_state(api.entity_id, 1).unwrap();
        assert!((near.confidence - 0.9).abs() < 1e-9);
        assert_eq!(near.predicted_state, "active");
        assert_eq!(near.related_states, vec!["active".to_string()]);

        let far = world.predict_state(api.entity_id, 50).unwrap();
        assert!((far.confidence - 0.3).abs() < 1e-9);

        assert!(matches!(
            world.predict_state(Uuid::new_v4(), 1),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn counterfactual_sums_relationship_strengths() {
        let (world, api, db) = model_with_pair();
        let cache = world.add_entity("cache", EntityType::Resource, "active", HashMap::new());
        world
            .add_relationship(api.entity_id, db.entity_id, "depends_on", 0.9, HashMap::new())
            .unwrap();
        world
            .add_relationship(api.entity_id, cache.entity_id, "uses", 0.4, HashMap::new())
            .unwrap();

        let analysis = world.counterfactual(api.entity_id, "down").unwrap();
        assert_eq!(analysis.affected_entities.len(), 2);
        assert!((analysis.total_impact - 1.3).abs() < 1e-9);
        assert_eq!(analysis.hypothetical_state, "down");
        assert_eq!(analysis.actual_state, "active");
    }

    #[test]
    fn simulation_does_not_mutate_real_state() {
        let (world, api, db) = model_with_pair();
        world
            .add_relationship(api.entity_id, db.entity_id, "depends_on", 0.8, HashMap::new())
            .unwrap();

        let result = world.simulate(
            "outage drill",
            HashMap::from([
                (api.entity_id, "down".to_string()),
                (Uuid::new_v4(), "down".to_string()),
            ]),
        );

        // The unknown entity is skipped, the known one analyzed
        assert_eq!(result.effects.len(), 1);
        assert_eq!(result.total_entities_affected, 1);
        assert_eq!(world.get_entity(api.entity_id).unwrap().state, "active");
        assert_eq!(world.simulation_count(), 1);
    }

    #[test]
    fn snapshots_are_stable_copies() {
        let (world, api, _) = model_with_pair();
        let snap = world.take_snapshot();
        assert_eq!(snap, "world-0");

        world.update_entity(api.entity_id, Some("down".to_string()), None);
        let snap2 = world.take_snapshot();
        assert_eq!(snap2, "world-1");
        assert_eq!(world.snapshot_count(), 2);
    }

    #[test]
    fn find_helpers() {
        let (world, api, _) = model_with_pair();
        world.update_entity(api.entity_id, Some("down".to_string()), None);

        assert_eq!(world.find_by_name("api").unwrap().entity_id, api.entity_id);
        assert!(world.find_by_name("ghost").is_none());
        assert_eq!(world.find_by_state("down").len(), 1);
        assert_eq!(world.find_by_type(EntityType::Resource).len(), 1);
    }
}
