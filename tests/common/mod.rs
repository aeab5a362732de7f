//! Shared fixtures: an in-memory database with the event schema and seed helpers

#![allow(dead_code)]

use async_trait::async_trait;
use entity_graph::Engine;
use entity_graph::config::{ClonePlan, Config};
use entity_graph::engine::{AssociationDescriptor, CloneCompleted, CloneEventSink};
use sqlx::SqlitePool;
use std::sync::{Arc, Mutex};

pub struct TestDb {
    pub config: Config,
    pub plan: ClonePlan,
    pub engine: Engine,
}

impl TestDb {
    pub fn pool(&self) -> &SqlitePool {
        self.config.pool()
    }

    /// Descriptor from the built-in plan by label, e.g. `zones` or `attachments[Event]`
    pub fn descriptor(&self, label: &str) -> AssociationDescriptor {
        self.plan
            .associations
            .iter()
            .find(|d| d.label() == label)
            .cloned()
            .unwrap_or_else(|| panic!("no descriptor labelled {}", label))
    }

    pub fn descriptors(&self, labels: &[&str]) -> Vec<AssociationDescriptor> {
        labels.iter().map(|label| self.descriptor(label)).collect()
    }
}

pub async fn setup() -> TestDb {
    let config = Config::new_test().await.expect("in-memory database");
    let plan = ClonePlan::event_configuration();
    let engine = plan.build_engine(config.coordinator()).expect("engine");
    TestDb { config, plan, engine }
}

/// Sink that keeps every event it receives
#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<CloneCompleted>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<CloneCompleted> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl CloneEventSink for RecordingSink {
    async fn clone_completed(&self, event: &CloneCompleted) {
        self.events.lock().unwrap().push(event.clone());
    }
}

pub fn recording_sink() -> Arc<RecordingSink> {
    Arc::new(RecordingSink::default())
}

pub async fn create_event(pool: &SqlitePool, name: &str) -> i64 {
    sqlx::query_scalar("INSERT INTO events (name) VALUES (?) RETURNING id")
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn create_zone(pool: &SqlitePool, event_id: i64, parent: Option<i64>, name: &str) -> i64 {
    sqlx::query_scalar("INSERT INTO zones (event_id, parent_zone_id, name) VALUES (?, ?, ?) RETURNING id")
        .bind(event_id)
        .bind(parent)
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn set_zone_parent(pool: &SqlitePool, zone_id: i64, parent: Option<i64>) {
    sqlx::query("UPDATE zones SET parent_zone_id = ? WHERE id = ?")
        .bind(parent)
        .bind(zone_id)
        .execute(pool)
        .await
        .unwrap();
}

pub async fn create_camera(pool: &SqlitePool, event_id: i64, label: &str) -> i64 {
    sqlx::query_scalar("INSERT INTO cameras (event_id, label) VALUES (?, ?) RETURNING id")
        .bind(event_id)
        .bind(label)
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn create_camera_zone(pool: &SqlitePool, event_id: i64, camera_id: i64, zone_id: i64) -> i64 {
    sqlx::query_scalar("INSERT INTO camera_zones (event_id, camera_id, zone_id) VALUES (?, ?, ?) RETURNING id")
        .bind(event_id)
        .bind(camera_id)
        .bind(zone_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn create_category(pool: &SqlitePool, event_id: i64, name: &str) -> i64 {
    sqlx::query_scalar("INSERT INTO categories (event_id, name) VALUES (?, ?) RETURNING id")
        .bind(event_id)
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn create_guide(pool: &SqlitePool, event_id: i64, category_id: Option<i64>, title: &str) -> i64 {
    sqlx::query_scalar("INSERT INTO reference_guides (event_id, category_id, title) VALUES (?, ?, ?) RETURNING id")
        .bind(event_id)
        .bind(category_id)
        .bind(title)
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn create_attachment(pool: &SqlitePool, owner_id: i64, owner_type: &str, file_name: &str) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO attachments (imageable_id, imageable_type, file_name) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(owner_id)
    .bind(owner_type)
    .bind(file_name)
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn create_priority_guide(pool: &SqlitePool, event_id: i64, content: &str) -> i64 {
    sqlx::query_scalar("INSERT INTO priority_guides (event_id, content) VALUES (?, ?) RETURNING id")
        .bind(event_id)
        .bind(content)
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn create_objective(pool: &SqlitePool, event_id: i64, title: &str, sort_order: i64) -> i64 {
    sqlx::query_scalar("INSERT INTO objectives (event_id, title, sort_order) VALUES (?, ?, ?) RETURNING id")
        .bind(event_id)
        .bind(title)
        .bind(sort_order)
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn create_sub_objective(
    pool: &SqlitePool,
    event_id: i64,
    objective_id: i64,
    title: &str,
    sort_order: i64,
) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO sub_objectives (event_id, objective_id, title, sort_order) VALUES (?, ?, ?, ?) RETURNING id",
    )
    .bind(event_id)
    .bind(objective_id)
    .bind(title)
    .bind(sort_order)
    .fetch_one(pool)
    .await
    .unwrap()
}

/// Rows in `table` whose `column` equals `value`
pub async fn count_where(pool: &SqlitePool, table: &str, column: &str, value: i64) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {} WHERE {} = ?", table, column))
        .bind(value)
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn count_for_event(pool: &SqlitePool, table: &str, event_id: i64) -> i64 {
    count_where(pool, table, "event_id", event_id).await
}

/// A source event populated across every association of the built-in plan
pub struct SeededEvent {
    pub event_id: i64,
    pub zone_root: i64,
    pub zone_child: i64,
    pub zone_grandchild: i64,
    pub camera: i64,
    pub category: i64,
    pub guide: i64,
    pub objective: i64,
}

pub async fn seed_full_event(pool: &SqlitePool, name: &str) -> SeededEvent {
    let event_id = create_event(pool, name).await;

    let zone_root = create_zone(pool, event_id, None, "Main hall").await;
    let zone_child = create_zone(pool, event_id, Some(zone_root), "Stage").await;
    let zone_grandchild = create_zone(pool, event_id, Some(zone_child), "Backstage").await;

    let camera = create_camera(pool, event_id, "Cam 1").await;
    create_camera(pool, event_id, "Cam 2").await;
    create_camera_zone(pool, event_id, camera, zone_child).await;

    let category = create_category(pool, event_id, "Security").await;
    let guide = create_guide(pool, event_id, Some(category), "Evacuation").await;
    create_guide(pool, event_id, None, "Lost and found").await;
    create_attachment(pool, guide, "ReferenceGuide", "map.png").await;
    create_attachment(pool, guide, "ReferenceGuide", "exits.pdf").await;
    create_attachment(pool, event_id, "Event", "banner.jpg").await;

    create_priority_guide(pool, event_id, "Safety first").await;

    let objective = create_objective(pool, event_id, "Open doors", 1).await;
    create_sub_objective(pool, event_id, objective, "Unlock east gate", 1).await;
    create_sub_objective(pool, event_id, objective, "Brief stewards", 2).await;

    SeededEvent {
        event_id,
        zone_root,
        zone_child,
        zone_grandchild,
        camera,
        category,
        guide,
        objective,
    }
}
