//! Ordering-gate integration tests.
//!
//! The central correctness property: out-of-order completion must never
//! cause a visually older slice to overwrite a newer one.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::time::{sleep, Duration};

use ndim_slicer::{ArraySource, EngineConfig, LayerData, SliceEngine, SliceEvent};

use super::test_utils::{expect_no_event, next_event, ramp, ramp_value, StepGatedSource};

fn async_engine() -> SliceEngine {
    SliceEngine::new(EngineConfig::default()).unwrap()
}

#[tokio::test]
async fn test_slow_old_extraction_never_overwrites_newer() {
    let engine = async_engine();
    let mut events = engine.subscribe().await;

    // extraction at t=1 blocks until the gate is released
    let gate = Arc::new(Semaphore::new(0));
    let source = StepGatedSource::new(ramp(&[10, 8, 8]), 0, 1, gate.clone());
    let layer = engine
        .add_layer(
            LayerData::single(Arc::new(source) as Arc<dyn ArraySource>).unwrap(),
            vec![1.0; 3],
            vec![0.0; 3],
        )
        .await
        .unwrap();

    // initial slice at t=0 (generation 1) is not gated
    let first = next_event(&mut events).await;
    assert_eq!(first.generation(), 1);

    // generation 2 starts extracting and parks on the gate
    engine.set_step(0, 1).await.unwrap();
    sleep(Duration::from_millis(50)).await;

    // generation 3 dispatches after it and completes immediately
    engine.set_step(0, 2).await.unwrap();

    let winner = next_event(&mut events).await;
    assert_eq!(winner.generation(), 3);
    match &winner {
        SliceEvent::SliceReady(result) => {
            assert_eq!(result.patch[[0, 0]], ramp_value(&[2, 0, 0]));
        }
        other => panic!("expected SliceReady, got {:?}", other),
    }

    // release the slow extraction; its late result must be discarded
    gate.add_permits(1);
    expect_no_event(&mut events).await;
    assert_eq!(engine.accepted_generation(layer).await, Some(3));
}

#[tokio::test]
async fn test_rapid_scrub_delivers_only_newest() {
    // position t:0 then t:1 then rapid t:2 before t=1's extraction
    // completes: only the t=2 slice is ever delivered for that layer.
    let engine = async_engine();
    let mut events = engine.subscribe().await;

    let gate = Arc::new(Semaphore::new(0));
    let source = StepGatedSource::new(ramp(&[10, 8, 8]), 0, 1, gate.clone());
    engine
        .add_layer(
            LayerData::single(Arc::new(source) as Arc<dyn ArraySource>).unwrap(),
            vec![1.0; 3],
            vec![0.0; 3],
        )
        .await
        .unwrap();

    let initial = next_event(&mut events).await;
    assert_eq!(initial.generation(), 1);

    engine.set_step(0, 1).await.unwrap();
    engine.set_step(0, 2).await.unwrap();

    let delivered = next_event(&mut events).await;
    assert_eq!(delivered.generation(), 3);
    match &delivered {
        SliceEvent::SliceReady(result) => {
            assert_eq!(result.patch[[3, 4]], ramp_value(&[2, 3, 4]));
        }
        other => panic!("expected SliceReady, got {:?}", other),
    }

    // whether t=1 was skipped before extraction or discarded on arrival,
    // it must never reach a subscriber
    gate.add_permits(1);
    expect_no_event(&mut events).await;
}

#[tokio::test]
async fn test_burst_scrub_generations_strictly_increase() {
    let engine = async_engine();
    let mut events = engine.subscribe().await;

    let layer = engine
        .add_layer(
            LayerData::single(super::test_utils::ramp_source(&[20, 8, 8])).unwrap(),
            vec![1.0; 3],
            vec![0.0; 3],
        )
        .await
        .unwrap();

    for t in 1..10 {
        engine.set_step(0, t).await.unwrap();
    }

    // the newest request always wins eventually
    let mut waited = 0;
    while engine.accepted_generation(layer).await != Some(10) {
        sleep(Duration::from_millis(20)).await;
        waited += 1;
        assert!(waited < 100, "generation 10 was never accepted");
    }

    let mut last_generation = 0;
    while let Ok(event) = events.try_recv() {
        assert!(
            event.generation() > last_generation,
            "generation {} delivered after {}",
            event.generation(),
            last_generation
        );
        last_generation = event.generation();
    }
    assert_eq!(last_generation, 10);
}

#[tokio::test]
async fn test_superseded_layer_removal_drops_inflight_result() {
    let engine = async_engine();
    let mut events = engine.subscribe().await;

    let gate = Arc::new(Semaphore::new(0));
    let source = StepGatedSource::new(ramp(&[10, 8, 8]), 0, 1, gate.clone());
    let layer = engine
        .add_layer(
            LayerData::single(Arc::new(source) as Arc<dyn ArraySource>).unwrap(),
            vec![1.0; 3],
            vec![0.0; 3],
        )
        .await
        .unwrap();
    next_event(&mut events).await;

    engine.set_step(0, 1).await.unwrap();
    sleep(Duration::from_millis(50)).await;

    engine.remove_layer(layer).await.unwrap();
    assert!(engine.layer_ids().await.is_empty());

    // the parked extraction completes against a removed layer
    gate.add_permits(1);
    expect_no_event(&mut events).await;
}

#[tokio::test]
async fn test_replaced_data_never_served_stale() {
    let engine = async_engine();
    let mut events = engine.subscribe().await;

    let gate = Arc::new(Semaphore::new(0));
    let source = StepGatedSource::new(ramp(&[10, 8, 8]), 0, 1, gate.clone());
    let layer = engine
        .add_layer(
            LayerData::single(Arc::new(source) as Arc<dyn ArraySource>).unwrap(),
            vec![1.0; 3],
            vec![0.0; 3],
        )
        .await
        .unwrap();
    next_event(&mut events).await;

    // old data starts a slow extraction at t=1
    engine.set_step(0, 1).await.unwrap();
    sleep(Duration::from_millis(50)).await;

    // replace the layer's data; the replacement slices t=1 immediately
    let replacement = ndarray::ArrayD::from_elem(ndarray::IxDyn(&[10, 8, 8]), 42.0f32);
    engine
        .set_layer_data(
            layer,
            LayerData::single(Arc::new(ndim_slicer::InMemorySource::new(replacement))
                as Arc<dyn ArraySource>)
            .unwrap(),
        )
        .await
        .unwrap();

    let fresh = next_event(&mut events).await;
    assert_eq!(fresh.generation(), 3);
    match &fresh {
        SliceEvent::SliceReady(result) => assert_eq!(result.patch[[0, 0]], 42.0),
        other => panic!("expected SliceReady, got {:?}", other),
    }

    // the old data's late result must be discarded, not cached, not shown
    gate.add_permits(1);
    expect_no_event(&mut events).await;
}
