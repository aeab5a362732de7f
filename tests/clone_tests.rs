//! Graph cloning against the built-in event configuration plan

mod common;

use common::*;
use entity_graph::engine::{AssociationDescriptor, AuditSink, CloneError, StrategyError};
use entity_graph::{ConfigurationError, ErrorKind};
use std::sync::Arc;

#[tokio::test]
async fn test_flat_clone_copies_every_child() {
    let db = setup().await;
    let source = create_event(db.pool(), "Spring Fair").await;
    let destination = create_event(db.pool(), "Autumn Fair").await;
    for label in ["A", "B", "C"] {
        create_camera(db.pool(), source, label).await;
    }

    let summary = db
        .engine
        .cloner
        .clone_graph(source, destination, &db.descriptors(&["cameras"]))
        .await
        .unwrap();

    assert_eq!(summary.total(), 3);
    assert_eq!(summary.count_for("cameras"), 3);
    assert_eq!(count_for_event(db.pool(), "cameras", destination).await, 3);
    assert_eq!(count_for_event(db.pool(), "cameras", source).await, 3);

    let labels: Vec<String> = sqlx::query_scalar("SELECT label FROM cameras WHERE event_id = ? ORDER BY label")
        .bind(destination)
        .fetch_all(db.pool())
        .await
        .unwrap();
    assert_eq!(labels, vec!["A", "B", "C"]);
}

#[tokio::test]
async fn test_hierarchy_points_at_new_parents() {
    let db = setup().await;
    let source = create_event(db.pool(), "Source").await;
    let destination = create_event(db.pool(), "Destination").await;
    let z1 = create_zone(db.pool(), source, None, "Z1").await;
    create_zone(db.pool(), source, Some(z1), "Z1a").await;

    let summary = db
        .engine
        .cloner
        .clone_graph(source, destination, &db.descriptors(&["zones"]))
        .await
        .unwrap();
    assert_eq!(summary.count_for("zones"), 2);

    let new_z1: i64 = sqlx::query_scalar("SELECT id FROM zones WHERE event_id = ? AND name = 'Z1'")
        .bind(destination)
        .fetch_one(db.pool())
        .await
        .unwrap();
    let new_z1a_parent: Option<i64> =
        sqlx::query_scalar("SELECT parent_zone_id FROM zones WHERE event_id = ? AND name = 'Z1a'")
            .bind(destination)
            .fetch_one(db.pool())
            .await
            .unwrap();

    assert_eq!(new_z1a_parent, Some(new_z1));
    assert_ne!(new_z1a_parent, Some(z1));
}

#[tokio::test]
async fn test_hierarchy_with_parent_created_after_child() {
    let db = setup().await;
    let source = create_event(db.pool(), "Source").await;
    let destination = create_event(db.pool(), "Destination").await;
    // child has the lower id, so insertion order alone would break the self reference
    let child = create_zone(db.pool(), source, None, "Booth").await;
    let parent = create_zone(db.pool(), source, None, "Expo").await;
    set_zone_parent(db.pool(), child, Some(parent)).await;

    db.engine
        .cloner
        .clone_graph(source, destination, &db.descriptors(&["zones"]))
        .await
        .unwrap();

    let rows: Vec<(i64, Option<i64>, String)> =
        sqlx::query_as("SELECT id, parent_zone_id, name FROM zones WHERE event_id = ? ORDER BY name")
            .bind(destination)
            .fetch_all(db.pool())
            .await
            .unwrap();
    let (booth, expo) = (&rows[0], &rows[1]);
    assert_eq!(booth.2, "Booth");
    assert_eq!(booth.1, Some(expo.0));
    assert_eq!(expo.1, None);
}

#[tokio::test]
async fn test_failed_strategy_leaves_no_partial_graph() {
    let db = setup().await;
    let source = seed_full_event(db.pool(), "Source").await;
    let destination = create_event(db.pool(), "Destination").await;

    // A link to another event's camera has nothing to be remapped to
    let elsewhere = create_event(db.pool(), "Elsewhere").await;
    let foreign_camera = create_camera(db.pool(), elsewhere, "Roof").await;
    create_camera_zone(db.pool(), source.event_id, foreign_camera, source.zone_root).await;

    let err = db
        .engine
        .cloner
        .clone_graph(source.event_id, destination, &db.plan.associations)
        .await
        .unwrap_err();

    match &err {
        CloneError::StrategyFailed { descriptor, cause } => {
            assert_eq!(descriptor, "camera_zones");
            assert!(matches!(cause, StrategyError::DanglingReference { old_id, .. } if *old_id == foreign_camera));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.kind(), ErrorKind::IntegrityViolation);

    for table in [
        "zones",
        "cameras",
        "camera_zones",
        "categories",
        "reference_guides",
        "priority_guides",
        "objectives",
        "sub_objectives",
    ] {
        assert_eq!(count_for_event(db.pool(), table, destination).await, 0, "{} leaked", table);
    }
    assert_eq!(count_where(db.pool(), "attachments", "imageable_id", destination).await, 0);
}

#[tokio::test]
async fn test_parent_outside_clone_is_a_dangling_self_reference() {
    let db = setup().await;
    let source = create_event(db.pool(), "Source").await;
    let destination = create_event(db.pool(), "Destination").await;
    let other = create_event(db.pool(), "Other").await;
    let foreign_parent = create_zone(db.pool(), other, None, "Elsewhere").await;
    let orphan = create_zone(db.pool(), source, Some(foreign_parent), "Orphan").await;

    let err = db
        .engine
        .cloner
        .clone_graph(source, destination, &db.descriptors(&["zones"]))
        .await
        .unwrap_err();

    assert!(matches!(
        &err,
        CloneError::StrategyFailed {
            cause: StrategyError::DanglingSelfReference { row, parent, .. },
            ..
        } if *row == orphan && *parent == foreign_parent
    ));
    assert_eq!(err.kind(), ErrorKind::IntegrityViolation);
    assert_eq!(count_for_event(db.pool(), "zones", destination).await, 0);
}

#[tokio::test]
async fn test_full_plan_clone() {
    let db = setup().await;
    let source = seed_full_event(db.pool(), "Source").await;
    let destination = create_event(db.pool(), "Destination").await;

    let summary = db
        .engine
        .cloner
        .clone_graph(source.event_id, destination, &db.plan.associations)
        .await
        .unwrap();

    assert_eq!(summary.count_for("zones"), 3);
    assert_eq!(summary.count_for("cameras"), 2);
    assert_eq!(summary.count_for("camera_zones"), 1);
    assert_eq!(summary.count_for("reference_guides"), 2);
    assert_eq!(summary.count_for("attachments"), 3);
    assert_eq!(summary.count_for("priority_guides"), 1);
    assert_eq!(summary.count_for("objectives"), 1);
    assert_eq!(summary.count_for("sub_objectives"), 2);
    assert_eq!(summary.total(), 15);
    // every cloned row plus the root pair
    assert_eq!(summary.remapped, 16);

    // camera link points at the copies, not the originals
    let (camera_id, zone_id): (i64, i64) =
        sqlx::query_as("SELECT camera_id, zone_id FROM camera_zones WHERE event_id = ?")
            .bind(destination)
            .fetch_one(db.pool())
            .await
            .unwrap();
    let camera_event: i64 = sqlx::query_scalar("SELECT event_id FROM cameras WHERE id = ?")
        .bind(camera_id)
        .fetch_one(db.pool())
        .await
        .unwrap();
    let zone_name: String = sqlx::query_scalar("SELECT name FROM zones WHERE id = ? AND event_id = ?")
        .bind(zone_id)
        .bind(destination)
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(camera_event, destination);
    assert_eq!(zone_name, "Stage");

    // sub-objectives follow their cloned objective
    let parents: Vec<i64> = sqlx::query_scalar("SELECT DISTINCT objective_id FROM sub_objectives WHERE event_id = ?")
        .bind(destination)
        .fetch_all(db.pool())
        .await
        .unwrap();
    assert_eq!(parents.len(), 1);
    assert_ne!(parents[0], source.objective);
    assert_eq!(count_where(db.pool(), "objectives", "id", parents[0]).await, 1);
}

#[tokio::test]
async fn test_attachments_follow_their_new_owner() {
    let db = setup().await;
    let source = seed_full_event(db.pool(), "Source").await;
    let destination = create_event(db.pool(), "Destination").await;

    db.engine
        .cloner
        .clone_graph(source.event_id, destination, &db.plan.associations)
        .await
        .unwrap();

    let new_guide: i64 = sqlx::query_scalar("SELECT id FROM reference_guides WHERE event_id = ? AND title = 'Evacuation'")
        .bind(destination)
        .fetch_one(db.pool())
        .await
        .unwrap();

    let guide_files: Vec<String> = sqlx::query_scalar(
        "SELECT file_name FROM attachments WHERE imageable_type = 'ReferenceGuide' AND imageable_id = ? ORDER BY file_name",
    )
    .bind(new_guide)
    .fetch_all(db.pool())
    .await
    .unwrap();
    assert_eq!(guide_files, vec!["exits.pdf", "map.png"]);

    let event_files: Vec<String> = sqlx::query_scalar(
        "SELECT file_name FROM attachments WHERE imageable_type = 'Event' AND imageable_id = ?",
    )
    .bind(destination)
    .fetch_all(db.pool())
    .await
    .unwrap();
    assert_eq!(event_files, vec!["banner.jpg"]);

    // originals untouched
    assert_eq!(count_where(db.pool(), "attachments", "imageable_id", source.guide).await, 2);
}

#[tokio::test]
async fn test_shared_lookup_reuses_destination_rows() {
    let db = setup().await;
    let source = create_event(db.pool(), "Source").await;
    let destination = create_event(db.pool(), "Destination").await;

    let existing = create_category(db.pool(), destination, "Security").await;
    let security = create_category(db.pool(), source, "security").await;
    let medical = create_category(db.pool(), source, "Medical").await;
    create_guide(db.pool(), source, Some(security), "Bag checks").await;
    create_guide(db.pool(), source, Some(medical), "First aid").await;

    db.engine
        .cloner
        .clone_graph(source, destination, &db.descriptors(&["reference_guides"]))
        .await
        .unwrap();

    let names: Vec<String> = sqlx::query_scalar("SELECT name FROM categories WHERE event_id = ? ORDER BY name")
        .bind(destination)
        .fetch_all(db.pool())
        .await
        .unwrap();
    assert_eq!(names, vec!["Medical", "Security"]);

    let bag_checks_category: i64 =
        sqlx::query_scalar("SELECT category_id FROM reference_guides WHERE event_id = ? AND title = 'Bag checks'")
            .bind(destination)
            .fetch_one(db.pool())
            .await
            .unwrap();
    assert_eq!(bag_checks_category, existing);
}

#[tokio::test]
async fn test_force_replace_keeps_a_single_row() {
    let db = setup().await;
    let source = create_event(db.pool(), "Source").await;
    let destination = create_event(db.pool(), "Destination").await;
    create_priority_guide(db.pool(), source, "Lead: Alice").await;
    create_priority_guide(db.pool(), destination, "Outdated").await;

    let descriptors = db.descriptors(&["priority_guides"]);
    for _ in 0..2 {
        db.engine
            .cloner
            .clone_graph(source, destination, &descriptors)
            .await
            .unwrap();
    }

    let contents: Vec<String> = sqlx::query_scalar("SELECT content FROM priority_guides WHERE event_id = ?")
        .bind(destination)
        .fetch_all(db.pool())
        .await
        .unwrap();
    assert_eq!(contents, vec!["Lead: Alice"]);
}

#[tokio::test]
async fn test_special_without_force_replace_keeps_existing_rows() {
    let db = setup().await;
    let source = create_event(db.pool(), "Source").await;
    let destination = create_event(db.pool(), "Destination").await;
    create_priority_guide(db.pool(), source, "Lead: Alice").await;
    create_priority_guide(db.pool(), destination, "Lead: Bob").await;

    let descriptor = AssociationDescriptor::Special {
        kind: "priority_guides".into(),
        parent_key: "event_id".into(),
        force_replace: false,
        references: vec![],
    };
    let summary = db
        .engine
        .cloner
        .clone_graph(source, destination, &[descriptor])
        .await
        .unwrap();

    assert_eq!(summary.total(), 0);
    let content: String = sqlx::query_scalar("SELECT content FROM priority_guides WHERE event_id = ?")
        .bind(destination)
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(content, "Lead: Bob");
}

fn cameras_as_special(force_replace: bool) -> AssociationDescriptor {
    AssociationDescriptor::Special {
        kind: "cameras".into(),
        parent_key: "event_id".into(),
        force_replace,
        references: vec![],
    }
}

#[tokio::test]
async fn test_referencing_a_kept_special_kind_is_rejected_before_writing() {
    let db = setup().await;
    let source = create_event(db.pool(), "Source").await;
    let destination = create_event(db.pool(), "Destination").await;
    let zone = create_zone(db.pool(), source, None, "Gate").await;
    let camera = create_camera(db.pool(), source, "North").await;
    create_camera_zone(db.pool(), source, camera, zone).await;
    create_camera(db.pool(), destination, "Existing").await;

    let descriptors = vec![
        db.descriptor("zones"),
        cameras_as_special(false),
        db.descriptor("camera_zones"),
    ];
    let err = db
        .engine
        .cloner
        .clone_graph(source, destination, &descriptors)
        .await
        .unwrap_err();

    assert!(matches!(
        &err,
        CloneError::Configuration(ConfigurationError::SkippableDependency { descriptor, kind })
            if descriptor == "camera_zones" && kind.as_str() == "cameras"
    ));
    assert_eq!(err.kind(), ErrorKind::ConfigurationError);
    assert_eq!(count_for_event(db.pool(), "zones", destination).await, 0);
    assert_eq!(count_for_event(db.pool(), "cameras", destination).await, 1);
}

#[tokio::test]
async fn test_replaced_special_rows_can_be_referenced() {
    let db = setup().await;
    let source = create_event(db.pool(), "Source").await;
    let destination = create_event(db.pool(), "Destination").await;
    let zone = create_zone(db.pool(), source, None, "Gate").await;
    let camera = create_camera(db.pool(), source, "North").await;
    create_camera_zone(db.pool(), source, camera, zone).await;
    create_camera(db.pool(), destination, "Existing").await;

    let descriptors = vec![
        db.descriptor("zones"),
        cameras_as_special(true),
        db.descriptor("camera_zones"),
    ];
    db.engine
        .cloner
        .clone_graph(source, destination, &descriptors)
        .await
        .unwrap();

    let labels: Vec<String> = sqlx::query_scalar("SELECT label FROM cameras WHERE event_id = ?")
        .bind(destination)
        .fetch_all(db.pool())
        .await
        .unwrap();
    assert_eq!(labels, vec!["North"]);

    let (camera_id, zone_id): (i64, i64) =
        sqlx::query_as("SELECT camera_id, zone_id FROM camera_zones WHERE event_id = ?")
            .bind(destination)
            .fetch_one(db.pool())
            .await
            .unwrap();
    let camera_owner: i64 = sqlx::query_scalar("SELECT event_id FROM cameras WHERE id = ?")
        .bind(camera_id)
        .fetch_one(db.pool())
        .await
        .unwrap();
    let zone_owner: i64 = sqlx::query_scalar("SELECT event_id FROM zones WHERE id = ?")
        .bind(zone_id)
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(camera_owner, destination);
    assert_eq!(zone_owner, destination);
}

#[tokio::test]
async fn test_missing_roots_are_not_found() {
    let db = setup().await;
    let event = create_event(db.pool(), "Only").await;
    let descriptors = db.descriptors(&["cameras"]);

    let err = db.engine.cloner.clone_graph(999, event, &descriptors).await.unwrap_err();
    assert!(matches!(err, CloneError::SourceNotFound(999)));
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = db.engine.cloner.clone_graph(event, 999, &descriptors).await.unwrap_err();
    assert!(matches!(err, CloneError::DestinationNotFound(999)));
}

#[tokio::test]
async fn test_out_of_order_descriptors_are_rejected_before_writing() {
    let db = setup().await;
    let source = seed_full_event(db.pool(), "Source").await;
    let destination = create_event(db.pool(), "Destination").await;

    let descriptors = db.descriptors(&["camera_zones", "cameras", "zones"]);
    let err = db
        .engine
        .cloner
        .clone_graph(source.event_id, destination, &descriptors)
        .await
        .unwrap_err();

    assert!(matches!(
        &err,
        CloneError::CyclicOrderingDetected { descriptor, missing }
            if descriptor == "camera_zones" && missing.as_str() == "cameras"
    ));
    assert_eq!(err.kind(), ErrorKind::OrderingViolation);
    assert_eq!(count_for_event(db.pool(), "cameras", destination).await, 0);
}

#[tokio::test]
async fn test_attachments_before_their_owner_are_rejected() {
    let db = setup().await;
    let source = create_event(db.pool(), "Source").await;
    let destination = create_event(db.pool(), "Destination").await;

    let descriptors = db.descriptors(&["attachments[ReferenceGuide]", "reference_guides"]);
    let err = db
        .engine
        .cloner
        .clone_graph(source, destination, &descriptors)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::OrderingViolation);
}

#[tokio::test]
async fn test_invalid_descriptor_lists_are_configuration_errors() {
    let db = setup().await;
    let source = create_event(db.pool(), "Source").await;
    let destination = create_event(db.pool(), "Destination").await;

    let err = db.engine.cloner.clone_graph(source, destination, &[]).await.unwrap_err();
    assert!(matches!(err, CloneError::Configuration(ConfigurationError::EmptyDescriptors)));
    assert_eq!(err.kind(), ErrorKind::ConfigurationError);

    let err = db
        .engine
        .cloner
        .clone_graph(source, source, &db.descriptors(&["cameras"]))
        .await
        .unwrap_err();
    assert!(matches!(err, CloneError::Configuration(ConfigurationError::SameRoot(_))));

    let err = db
        .engine
        .cloner
        .clone_graph(source, destination, &db.descriptors(&["cameras", "cameras"]))
        .await
        .unwrap_err();
    assert!(matches!(err, CloneError::Configuration(ConfigurationError::DuplicateDescriptor(_))));
}

#[tokio::test]
async fn test_nested_transactions_are_rejected() {
    let db = setup().await;
    let coordinator = db.config.coordinator();
    let tx = coordinator.begin().await.unwrap();

    let err = coordinator.begin_nested(&tx).unwrap_err();
    assert!(matches!(err, ConfigurationError::NestedTransaction { parent } if parent == tx.id()));

    coordinator.rollback(tx).await.unwrap();
}

#[tokio::test]
async fn test_clone_within_uses_the_callers_transaction() {
    let db = setup().await;
    let coordinator = db.config.coordinator();
    let source = create_event(db.pool(), "Source").await;
    create_camera(db.pool(), source, "Cam").await;
    let descriptors = db.descriptors(&["cameras"]);

    // Rolled back by the caller: nothing persists
    let destination = create_event(db.pool(), "Dropped").await;
    let mut tx = coordinator.begin().await.unwrap();
    let summary = db
        .engine
        .cloner
        .clone_within(&mut tx, source, destination, &descriptors)
        .await
        .unwrap();
    assert_eq!(summary.total(), 1);
    coordinator.rollback(tx).await.unwrap();
    assert_eq!(count_for_event(db.pool(), "cameras", destination).await, 0);

    // Committed by the caller: the copy is kept
    let mut tx = coordinator.begin().await.unwrap();
    db.engine
        .cloner
        .clone_within(&mut tx, source, destination, &descriptors)
        .await
        .unwrap();
    coordinator.commit(tx).await.unwrap();
    assert_eq!(count_for_event(db.pool(), "cameras", destination).await, 1);
}

#[tokio::test]
async fn test_sink_only_hears_about_committed_clones() {
    let db = setup().await;
    let sink = recording_sink();
    let cloner = entity_graph::engine::GraphCloner::new(
        Arc::new(db.plan.registry().unwrap()),
        db.config.coordinator(),
        db.plan.root_kind().clone(),
    )
    .with_sink(sink.clone());

    let source = create_event(db.pool(), "Source").await;
    let destination = create_event(db.pool(), "Destination").await;
    create_camera(db.pool(), source, "Cam").await;

    cloner
        .clone_graph(source, destination, &db.descriptors(&["cameras"]))
        .await
        .unwrap();
    cloner
        .clone_graph(999, destination, &db.descriptors(&["cameras"]))
        .await
        .unwrap_err();

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].root_id, destination);
    assert_eq!(events[0].source_root_id, source);
    assert_eq!(events[0].summary.total(), 1);
}

#[tokio::test]
async fn test_audit_sink_records_clone_runs() {
    let db = setup().await;
    let engine = db
        .plan
        .build_engine(db.config.coordinator())
        .unwrap()
        .with_sink(Arc::new(AuditSink::new(db.pool().clone())));

    let source = seed_full_event(db.pool(), "Source").await;
    let destination = create_event(db.pool(), "Destination").await;

    engine
        .cloner
        .clone_graph(source.event_id, destination, &db.plan.associations)
        .await
        .unwrap();

    let (source_root, rows_cloned, summary_json): (i64, i64, String) = sqlx::query_as(
        "SELECT source_root_id, rows_cloned, summary_json FROM clone_runs WHERE destination_root_id = ?",
    )
    .bind(destination)
    .fetch_one(db.pool())
    .await
    .unwrap();

    assert_eq!(source_root, source.event_id);
    assert_eq!(rows_cloned, 15);
    let summary: serde_json::Value = serde_json::from_str(&summary_json).unwrap();
    assert_eq!(summary["destination_root_id"], destination);
}
