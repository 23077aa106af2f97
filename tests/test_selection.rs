//! End-to-end tests for route submissions: render, duplicate scan, persist.

mod common;

use std::sync::Arc;

use image::GenericImageView;
use spraywall::annotate::ACCEPTED_COLOR;
use spraywall::models::{BoundingBox, Detection, HoldColor};

use common::*;

fn selection(ids: &[u32]) -> SelectionRequest {
    SelectionRequest::new(ids.iter().copied(), wall_detections(), wall_image())
}

#[tokio::test]
async fn test_new_route_is_saved_when_store_is_empty() -> anyhow::Result<()> {
    let (store, _temp_dir) = create_test_store().await;
    let comparator = Arc::new(MockComparator::always(Reply::Match(None)));
    let orchestrator = orchestrator(store.clone(), comparator.clone());

    let outcome = orchestrator.submit("sub-1", selection(&[0, 2])).await?;

    let SelectionOutcome::Saved {
        route,
        accepted,
        comparison,
        comparison_name,
        explanation,
    } = outcome
    else {
        panic!("expected the route to be saved");
    };
    assert_eq!(explanation, NO_ROUTES_EXPLANATION);
    assert_eq!(comparator.calls(), 0);
    assert!(route.name.starts_with("blue_"));
    assert!(comparison_name.starts_with("red_"));
    assert_eq!((accepted.image.width(), accepted.image.height()), (WALL_SIZE, WALL_SIZE));
    assert_ne!(accepted.jpeg, comparison.jpeg);

    // Only the blue rendering is left behind
    assert_eq!(dir_listing(&store), vec![route.name.clone()]);
    assert_eq!(store.read(&route.name).await?, accepted.jpeg);
    Ok(())
}

#[tokio::test]
async fn test_matching_route_is_not_stored_again() -> anyhow::Result<()> {
    let (store, _temp_dir) = create_test_store().await;
    let first = orchestrator(store.clone(), Arc::new(MockComparator::always(Reply::NoMatch(None))));
    let stored = first.submit("sub-1", selection(&[0, 1])).await?;
    let stored_name = stored.route().name.clone();

    let comparator = Arc::new(MockComparator::always(Reply::Match(Some("Same three holds."))));
    let second = orchestrator(store.clone(), comparator.clone());
    let outcome = second.submit("sub-2", selection(&[0, 1])).await?;

    assert!(outcome.is_match());
    assert_eq!(outcome.route().name, stored_name);
    assert_eq!(outcome.explanation(), "Same three holds.");
    assert_eq!(comparator.calls(), 1);
    assert_eq!(dir_listing(&store), vec![stored_name]);
    Ok(())
}

#[tokio::test]
async fn test_comparator_outage_saves_route() -> anyhow::Result<()> {
    let (store, _temp_dir) = create_test_store().await;
    let existing = store.save(&stored_rendering(b"route-A")).await?;
    let comparator = Arc::new(MockComparator::always(Reply::Fail));
    let orchestrator = orchestrator(store.clone(), comparator.clone());

    let outcome = orchestrator.submit("sub-1", selection(&[1])).await?;

    assert!(!outcome.is_match());
    assert_eq!(outcome.explanation(), UNAVAILABLE_EXPLANATION);
    assert_eq!(comparator.calls(), 1);
    let names = route_names(&store.list().await?);
    assert_eq!(names.len(), 2);
    assert!(names.contains(&existing.name));
    assert!(dir_listing(&store).iter().all(|name| name.starts_with("blue_")));
    Ok(())
}

#[tokio::test]
async fn test_empty_selection_has_no_side_effects() -> anyhow::Result<()> {
    let (store, _temp_dir) = create_test_store().await;
    let comparator = Arc::new(MockComparator::always(Reply::NoMatch(None)));
    let orchestrator = orchestrator(store.clone(), comparator.clone());

    let err = orchestrator.submit("sub-1", selection(&[])).await.unwrap_err();
    assert!(matches!(err, PipelineError::EmptySelection));

    // Ids that name no detected hold are equally empty
    let err = orchestrator.submit("sub-2", selection(&[41, 42])).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    assert!(dir_listing(&store).is_empty());
    assert_eq!(comparator.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn test_hold_outside_image_is_rejected() -> anyhow::Result<()> {
    let (store, _temp_dir) = create_test_store().await;
    let orchestrator = orchestrator(store.clone(), Arc::new(MockComparator::always(Reply::NoMatch(None))));
    let small = wall_image().crop_imm(0, 0, 100, 100);
    assert_eq!(small.dimensions(), (100, 100));

    let request = SelectionRequest::new([0], wall_detections(), small);
    let err = orchestrator.submit("sub-1", request).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(dir_listing(&store).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_unselected_hold_outside_image_is_ignored() -> anyhow::Result<()> {
    let (store, _temp_dir) = create_test_store().await;
    let orchestrator = orchestrator(store.clone(), Arc::new(MockComparator::always(Reply::NoMatch(None))));
    let mut detections = wall_detections();
    detections.push(Detection {
        id: 3,
        class: "hold".to_string(),
        confidence: 0.9,
        color: HoldColor::Unknown,
        bbox: BoundingBox::new(900, 900, 950, 950)?,
    });

    let request = SelectionRequest::new([0], detections, wall_image());
    let outcome = orchestrator.submit("sub-1", request).await?;

    assert!(!outcome.is_match());
    assert_eq!(dir_listing(&store), vec![outcome.route().name.clone()]);
    Ok(())
}

#[tokio::test]
async fn test_stale_selected_id_is_ignored() -> anyhow::Result<()> {
    let (store, _temp_dir) = create_test_store().await;
    let orchestrator = orchestrator(store.clone(), Arc::new(MockComparator::always(Reply::NoMatch(None))));
    let detections = wall_detections().into_iter().take(2).collect();

    // Hold 2 is not among the detections; hold 0 still forms the route
    let request = SelectionRequest::new([0, 2], detections, wall_image());
    let outcome = orchestrator.submit("sub-1", request).await?;

    let SelectionOutcome::Saved { route, accepted, .. } = outcome else {
        panic!("expected the route to be saved");
    };
    assert_eq!(*accepted.image.get_pixel(20, 50), ACCEPTED_COLOR);
    assert_ne!(*accepted.image.get_pixel(100, 130), ACCEPTED_COLOR);
    assert_eq!(dir_listing(&store), vec![route.name]);
    Ok(())
}

#[tokio::test]
async fn test_storage_failure_is_reported() -> anyhow::Result<()> {
    let (store, temp_dir) = create_test_store().await;
    let orchestrator = orchestrator(store.clone(), Arc::new(MockComparator::always(Reply::NoMatch(None))));
    std::fs::remove_dir_all(temp_dir.path().join("images"))?;

    let err = orchestrator.submit("sub-1", selection(&[0])).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_identical_submissions_both_store() -> anyhow::Result<()> {
    let (store, _temp_dir) = create_test_store().await;
    let comparator = Arc::new(MockComparator::always(Reply::NoMatch(None)));
    let orchestrator = Arc::new(orchestrator(store.clone(), comparator));

    let a = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.submit("sub-a", selection(&[0, 1, 2])).await }
    });
    let b = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.submit("sub-b", selection(&[0, 1, 2])).await }
    });
    let (a, b) = (a.await??, b.await??);

    // Both may miss each other; neither write is lost
    assert_ne!(a.route().name, b.route().name);
    let stored = dir_listing(&store);
    assert!(stored.contains(&a.route().name));
    assert!(!stored.iter().any(|name| name.starts_with("red_")));
    Ok(())
}
