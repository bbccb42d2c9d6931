//! Benchmarks for run execution.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use draftflow::config::EngineConfig;
use draftflow::context::{RunId, RunInput};
use draftflow::pipeline::Orchestrator;
use draftflow::testing::{answers, StageFixture};

fn pipeline_benchmark(c: &mut Criterion) {
    let Ok(runtime) = tokio::runtime::Builder::new_current_thread().enable_all().build() else {
        return;
    };
    let fixture = StageFixture::approving();
    let orchestrator = Orchestrator::new(fixture.stage_set(), EngineConfig::default());
    let replies = answers(&[("q1", "engineers"), ("q2", "faster builds")]);

    c.bench_function("approve_to_complete", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let run_id = RunId::new();
                let paused = orchestrator
                    .start(run_id, RunInput::new("bench idea"), serde_json::Value::Null)
                    .await;
                let done = orchestrator.resume(run_id, paused, replies.clone()).await;
                black_box(done)
            })
        });
    });
}

criterion_group!(benches, pipeline_benchmark);
criterion_main!(benches);
