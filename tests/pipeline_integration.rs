//! Pipeline Integration Tests
//!
//! Full lifecycle of the assembled pipeline over mock decoders and devices:
//! stream frames reaching sinks, captured frames reaching the device, and
//! configuration-driven transitions.


use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use pipeline_test_utils::{
    init_tracing, solid_rgba_frame, wait_for, MockDecoder, MockOutputDevice, SessionScript,
};
use vcam_core::decoder::StreamDecoder;
use vcam_core::error::PipelineError;
use vcam_core::frame::PixelFormat;
use vcam_core::pipeline::{PipelineConfig, VirtualCameraPipeline};
use vcam_core::receiver::{ConnectionState, ReceiverConfig};

fn test_config(enabled: bool) -> PipelineConfig {
    init_tracing();
    PipelineConfig {
        stream_url: "rtmp://mock/live".into(),
        enabled,
        receiver: ReceiverConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
        },
        ..PipelineConfig::hd_720p()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_lifecycle_guards() {
    let decoder = Arc::new(MockDecoder::always_failing());
    let mut pipeline = VirtualCameraPipeline::new(test_config(false), decoder);

    assert!(matches!(pipeline.stop().await, Err(PipelineError::NotRunning)));

    let (device, _) = MockOutputDevice::new();
    pipeline.start_with_device(Box::new(device)).await.unwrap();
    assert!(pipeline.is_running());

    let (device, _) = MockOutputDevice::new();
    assert!(matches!(
        pipeline.start_with_device(Box::new(device)).await,
        Err(PipelineError::AlreadyRunning)
    ));

    pipeline.stop().await.unwrap();
    assert!(!pipeline.is_running());
    assert!(matches!(pipeline.stop().await, Err(PipelineError::NotRunning)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stream_frames_reach_sinks() {
    let decoder = Arc::new(MockDecoder::new(vec![SessionScript::Frames(10)]));
    let mut pipeline = VirtualCameraPipeline::new(test_config(true), decoder);

    let (device, _) = MockOutputDevice::new();
    pipeline.start_with_device(Box::new(device)).await.unwrap();

    let buffer = pipeline.buffer();
    assert!(
        wait_for(Duration::from_secs(2), || buffer.stats().total_frames == 10),
        "stream frames never arrived, stats: {:?}",
        buffer.stats()
    );

    // The decoder produces 64x48 I420; ask the sink for something else
    let sink = pipeline.sink();
    let mut dest = vec![0u8; PixelFormat::Nv21.buffer_size(32, 24)];
    assert!(sink.deliver(PixelFormat::Nv21, 32, 24, &mut dest));

    pipeline.stop().await.unwrap();
    assert_eq!(pipeline.stats().buffer.total_frames, 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_submitted_frames_reach_the_device() {
    let decoder = Arc::new(MockDecoder::always_failing());
    let mut pipeline = VirtualCameraPipeline::new(test_config(false), decoder);

    let (device, counters) = MockOutputDevice::new();
    pipeline.start_with_device(Box::new(device)).await.unwrap();

    // Capture geometry differs from the fixed 1280x720 output geometry
    pipeline.submit(solid_rgba_frame(640, 480, 255, 0, 0, 1)).unwrap();

    assert!(wait_for(Duration::from_secs(2), || {
        counters.writes.load(Ordering::SeqCst) == 1
    }));
    assert_eq!(
        *counters.last_write_len.lock().unwrap(),
        Some(PixelFormat::I420.buffer_size(1280, 720))
    );
    // Geometry negotiated once, at start
    assert_eq!(counters.format_calls.load(Ordering::SeqCst), 1);
    assert_eq!(*counters.last_geometry.lock().unwrap(), Some((1280, 720)));

    pipeline.stop().await.unwrap();
    let stats = pipeline.stats();
    assert_eq!(stats.frames_submitted, 1);
    assert_eq!(stats.frames_written, 1);
    assert_eq!(stats.frames_dropped, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_submit_rejected_when_not_running() {
    let decoder = Arc::new(MockDecoder::always_failing());
    let pipeline = VirtualCameraPipeline::new(test_config(false), decoder);
    let result = pipeline.submit(solid_rgba_frame(64, 48, 0, 0, 0, 1));
    assert!(matches!(result, Err(PipelineError::NotRunning)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_disable_disconnects_the_stream() {
    let decoder = Arc::new(MockDecoder::new(vec![SessionScript::BlockUntilAbort]));
    let mut pipeline = VirtualCameraPipeline::new(test_config(true), decoder);

    let (device, _) = MockOutputDevice::new();
    pipeline.start_with_device(Box::new(device)).await.unwrap();
    assert!(wait_for(Duration::from_secs(2), || {
        pipeline.stats().connection == ConnectionState::Streaming
    }));

    let mut disabled = pipeline.config().clone();
    disabled.enabled = false;
    pipeline.update_config(disabled);
    assert_eq!(pipeline.stats().connection, ConnectionState::Disconnected);

    pipeline.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_enable_while_running_connects_the_stream() {
    let decoder = Arc::new(MockDecoder::new(vec![SessionScript::BlockUntilAbort]));
    let mut pipeline = VirtualCameraPipeline::new(
        test_config(false),
        Arc::clone(&decoder) as Arc<dyn StreamDecoder>,
    );

    let (device, _) = MockOutputDevice::new();
    pipeline.start_with_device(Box::new(device)).await.unwrap();
    assert_eq!(decoder.open_calls(), 0);

    let mut enabled = pipeline.config().clone();
    enabled.enabled = true;
    pipeline.update_config(enabled);

    assert!(wait_for(Duration::from_secs(2), || {
        pipeline.stats().connection == ConnectionState::Streaming
    }));
    assert_eq!(decoder.open_calls(), 1);

    pipeline.stop().await.unwrap();
    assert_eq!(pipeline.stats().connection, ConnectionState::Disconnected);
}
