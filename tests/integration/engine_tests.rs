//! End-to-end engine behavior: caching, world coordinates, failure
//! isolation and subscriber delivery.

use std::sync::Arc;

use ndim_slicer::{
    ArraySource, EngineConfig, LayerData, SliceEngine, SliceEvent,
};

use super::test_utils::{drain, next_event, ramp_pyramid, ramp_source, CountingSource, FailingSource};

fn sync_engine() -> SliceEngine {
    SliceEngine::new(EngineConfig::synchronous()).unwrap()
}

#[tokio::test]
async fn test_idempotent_positions_hit_cache() {
    let engine = sync_engine();
    let source = CountingSource::new(&[10, 8, 8]);
    engine
        .add_layer(
            LayerData::single(source.clone() as Arc<dyn ArraySource>).unwrap(),
            vec![1.0; 3],
            vec![0.0; 3],
        )
        .await
        .unwrap();
    assert_eq!(source.reads(), 1);

    // issuing the same position again performs zero new extractions
    let position = engine.position().await.unwrap();
    engine.set_position((*position).clone()).await.unwrap();
    assert_eq!(source.reads(), 1);

    engine.set_step(0, 4).await.unwrap();
    assert_eq!(source.reads(), 2);
    engine.set_step(0, 4).await.unwrap();
    assert_eq!(source.reads(), 2);
}

#[tokio::test]
async fn test_cache_eviction_is_lru_via_engine() {
    let engine = SliceEngine::new(EngineConfig::synchronous().with_cache_capacity(4)).unwrap();
    let source = CountingSource::new(&[10, 8, 8]);
    engine
        .add_layer(
            LayerData::single(source.clone() as Arc<dyn ArraySource>).unwrap(),
            vec![1.0; 3],
            vec![0.0; 3],
        )
        .await
        .unwrap();

    // visit t=0..=4: five distinct slices through a 4-entry cache
    for t in 1..=4 {
        engine.set_step(0, t).await.unwrap();
    }
    assert_eq!(source.reads(), 5);
    assert_eq!(engine.cache_len().await, 4);

    // t=1..=4 are still cached
    for t in (1..=4).rev() {
        engine.set_step(0, t).await.unwrap();
    }
    assert_eq!(source.reads(), 5);

    // t=0 was the least recently used and must have been evicted
    engine.set_step(0, 0).await.unwrap();
    assert_eq!(source.reads(), 6);
}

#[tokio::test]
async fn test_world_coordinates_follow_transform() {
    let engine = sync_engine();
    let mut events = engine.subscribe().await;

    let scale = vec![2.0, 0.5, 0.25];
    let translate = vec![10.0, -5.0, 3.0];
    engine
        .add_layer(
            LayerData::single(ramp_source(&[4, 8, 8])).unwrap(),
            scale.clone(),
            translate.clone(),
        )
        .await
        .unwrap();

    let event = next_event(&mut events).await;
    let SliceEvent::SliceReady(result) = event else {
        panic!("expected SliceReady");
    };

    // displayed axes are 1 and 2
    assert_eq!(result.world_offset, vec![-5.0, 3.0]);
    assert_eq!(result.world_scale, vec![0.5, 0.25]);

    // round trip: data index -> world coordinate -> data index
    for (i, (&offset, &step)) in result
        .world_offset
        .iter()
        .zip(result.world_scale.iter())
        .enumerate()
    {
        for index in 0..result.patch.shape()[i] {
            let world = offset + step * index as f64;
            let recovered = ((world - offset) / step).round() as usize;
            assert_eq!(recovered, index);
        }
    }
}

#[tokio::test]
async fn test_failing_layer_reports_and_isolates() {
    let engine = SliceEngine::new(EngineConfig::default()).unwrap();
    let mut events = engine.subscribe().await;

    let good = engine
        .add_layer(
            LayerData::single(ramp_source(&[10, 8, 8])).unwrap(),
            vec![1.0; 3],
            vec![0.0; 3],
        )
        .await
        .unwrap();
    let good_initial = next_event(&mut events).await;
    assert!(matches!(good_initial, SliceEvent::SliceReady(_)));

    let bad = engine
        .add_layer(
            LayerData::single(FailingSource::new(&[10, 8, 8]) as Arc<dyn ArraySource>).unwrap(),
            vec![1.0; 3],
            vec![0.0; 3],
        )
        .await
        .unwrap();

    let failure = next_event(&mut events).await;
    match &failure {
        SliceEvent::SliceFailed { layer_id, error, .. } => {
            assert_eq!(*layer_id, bad);
            assert!(error.to_string().contains("simulated I/O failure"));
        }
        other => panic!("expected SliceFailed, got {:?}", other),
    }

    // the failing layer does not disturb the healthy one
    engine.set_step(0, 3).await.unwrap();
    let mut ready_layers = Vec::new();
    let mut failed_layers = Vec::new();
    for _ in 0..2 {
        match next_event(&mut events).await {
            SliceEvent::SliceReady(result) => ready_layers.push(result.layer_id),
            SliceEvent::SliceFailed { layer_id, .. } => failed_layers.push(layer_id),
        }
    }
    assert_eq!(ready_layers, vec![good]);
    assert_eq!(failed_layers, vec![bad]);

    assert_eq!(engine.accepted_generation(good).await, Some(2));
    assert_eq!(engine.accepted_generation(bad).await, None);
}

#[tokio::test]
async fn test_layers_slice_independently() {
    let engine = sync_engine();
    let mut events = engine.subscribe().await;

    let small = engine
        .add_layer(
            LayerData::single(ramp_source(&[10, 8, 8])).unwrap(),
            vec![1.0; 3],
            vec![0.0; 3],
        )
        .await
        .unwrap();
    let large = engine
        .add_layer(
            LayerData::single(ramp_source(&[10, 16, 16])).unwrap(),
            vec![1.0; 3],
            vec![0.0; 3],
        )
        .await
        .unwrap();
    drain(&mut events);

    engine.set_step(0, 7).await.unwrap();
    let delivered = drain(&mut events);
    assert_eq!(delivered.len(), 2);

    let shapes: Vec<(ndim_slicer::LayerId, Vec<usize>)> = delivered
        .iter()
        .filter_map(|e| match e {
            SliceEvent::SliceReady(r) => Some((r.layer_id, r.patch.shape().to_vec())),
            _ => None,
        })
        .collect();
    assert!(shapes.contains(&(small, vec![8, 8])));
    assert!(shapes.contains(&(large, vec![16, 16])));
}

#[tokio::test]
async fn test_volumetric_display_slices_three_axes() {
    let engine = sync_engine();
    let mut events = engine.subscribe().await;

    engine
        .add_layer(
            LayerData::single(ramp_source(&[6, 10, 8, 8])).unwrap(),
            vec![1.0; 4],
            vec![0.0; 4],
        )
        .await
        .unwrap();
    drain(&mut events);

    engine.set_displayed(vec![1, 2, 3]).await.unwrap();
    let delivered = drain(&mut events);
    assert_eq!(delivered.len(), 1);
    let SliceEvent::SliceReady(result) = &delivered[0] else {
        panic!("expected SliceReady");
    };
    assert_eq!(result.patch.shape(), &[10, 8, 8]);
    assert_eq!(result.displayed, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_pyramid_layer_end_to_end() {
    let engine = sync_engine();
    let mut events = engine.subscribe().await;

    engine
        .add_layer(
            ramp_pyramid(&[vec![4, 1000, 1000], vec![4, 500, 500], vec![4, 250, 250]]),
            vec![1.0, 0.5, 0.5],
            vec![0.0; 3],
        )
        .await
        .unwrap();
    drain(&mut events);

    engine
        .set_viewport(ndim_slicer::Viewport {
            canvas_size_px: [500.0, 500.0],
            field_of_view_world: [500.0, 500.0],
        })
        .await;

    let delivered = drain(&mut events);
    assert_eq!(delivered.len(), 1);
    let SliceEvent::SliceReady(result) = &delivered[0] else {
        panic!("expected SliceReady");
    };
    assert_eq!(result.level, 1);
    assert_eq!(result.patch.shape(), &[500, 500]);
}
