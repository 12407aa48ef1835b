//! Envelope codec benchmark suite.
//!
//! Measures frame encode/decode for control frames and for `stream_data`
//! pushes of increasing size, plus typed parsing of the decoded payload.
//!
//! Run with: cargo bench --bench envelope_codec
//! Results saved to: target/criterion/

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use serde_json::{Map, Value, json};

use transit_stream::Envelope;
use transit_stream::stream::PredictionsStreamDataResponse;

// ============================================================================
// Benchmark Parameters
// ============================================================================

const PREDICTION_COUNTS: &[usize] = &[1, 50, 500];

// ============================================================================
// Fixtures
// ============================================================================

fn predictions_payload(count: usize) -> Value {
    let predictions: Map<String, Value> = (0..count)
        .map(|i| {
            let id = format!("prediction-{i}");
            let prediction = json!({
                "id": id,
                "arrival_time": "2026-10-16T12:00:00-04:00",
                "departure_time": "2026-10-16T12:01:00-04:00",
                "direction_id": i % 2,
                "revenue": true,
                "schedule_relationship": "scheduled",
                "status": null,
                "stop_sequence": i,
                "route_id": "Red",
                "stop_id": format!("stop-{}", i % 10),
                "trip_id": format!("trip-{i}"),
                "vehicle_id": null
            });
            (id, prediction)
        })
        .collect();

    json!({ "predictions": predictions, "trips": {}, "vehicles": {} })
}

fn push_frame(count: usize) -> String {
    Envelope::new(
        Some("3".to_string()),
        "",
        "predictions:stops",
        "stream_data",
        predictions_payload(count),
    )
    .encode()
    .expect("fixture encodes")
}

// ============================================================================
// Benchmark: Control Frames
// ============================================================================

fn bench_control_frames(c: &mut Criterion) {
    let mut group = c.benchmark_group("control_frames");

    let heartbeat = Envelope::heartbeat("42");
    group.bench_function("encode_heartbeat", |b| {
        b.iter(|| black_box(&heartbeat).encode())
    });

    let reply = r#"["3","3","predictions:stops","phx_reply",{"status":"ok","response":{}}]"#;
    group.bench_function("decode_reply", |b| {
        b.iter(|| Envelope::decode(black_box(reply)))
    });

    group.finish();
}

// ============================================================================
// Benchmark: Stream Data
// ============================================================================

fn bench_stream_data(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_data");

    for &count in PREDICTION_COUNTS {
        let frame = push_frame(count);
        group.throughput(Throughput::Bytes(frame.len() as u64));

        group.bench_with_input(BenchmarkId::new("decode", count), &frame, |b, frame| {
            b.iter(|| Envelope::decode(black_box(frame)))
        });

        let envelope = Envelope::decode(&frame).expect("fixture decodes");
        group.bench_with_input(BenchmarkId::new("encode", count), &envelope, |b, envelope| {
            b.iter(|| black_box(envelope).encode())
        });

        group.bench_with_input(BenchmarkId::new("parse", count), &envelope, |b, envelope| {
            b.iter(|| {
                serde_json::from_value::<PredictionsStreamDataResponse>(black_box(envelope.data().clone()))
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_control_frames, bench_stream_data);
criterion_main!(benches);
