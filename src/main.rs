use mlstream::{Pipeline, PipelineConfig, PipelineState, TensorsData, TensorsInfo};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

fn main() -> anyhow::Result<()> {
    println!("mlstream - pipeline demo");
    println!("========================\n");

    let config = PipelineConfig::from_json(&serde_json::json!({
        "pipeline_config": { "channel_capacity": 16, "worker_threads": 2 }
    }))?;

    let description = "videotestsrc num-buffers=30 pattern=snow ! \
                       video/x-raw,format=RGB,width=32,height=24,framerate=30/1 ! \
                       tensor_converter ! valve name=gate ! tensor_sink name=out";
    println!("Building: {}\n", description);
    let pipeline = Pipeline::construct_with_config(
        description,
        Some(Arc::new(|state: PipelineState| println!("state -> {}", state))),
        config,
    )?;

    let frames = Arc::new(AtomicUsize::new(0));
    let frames_cb = Arc::clone(&frames);
    let sink = pipeline.sink_register(
        "out",
        Arc::new(move |data: &TensorsData, info: &TensorsInfo| {
            let n = frames_cb.fetch_add(1, Ordering::SeqCst);
            if n % 10 == 0 {
                let bytes = data.tensor_data(0).map(|d| d.len()).unwrap_or(0);
                println!("frame {:>3}: {} tensor(s), {} bytes", n, info.count(), bytes);
            }
        }),
    )?;
    let gate = pipeline.valve_handle("gate")?;

    pipeline.start()?;
    sleep(Duration::from_millis(500));
    gate.set_open(false)?;
    println!("valve closed after {} frames", frames.load(Ordering::SeqCst));
    sleep(Duration::from_millis(300));
    gate.set_open(true)?;
    sleep(Duration::from_millis(700));

    for m in pipeline.metrics_snapshot()? {
        println!(
            "{:<20} processed={:<4} dropped={:<4} errors={}",
            m.element, m.buffers_processed, m.buffers_dropped, m.errors_count
        );
    }

    sink.unregister()?;
    gate.release()?;
    pipeline.destroy()?;
    println!("\nDemo complete: {} frames delivered", frames.load(Ordering::SeqCst));
    Ok(())
}
