use mlstream::{
    register_easy_filter, register_if_condition, BufferPolicy, Pipeline, SinkCallback, Status, TensorType,
    TensorsData, TensorsInfo,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::sleep;
use std::time::{Duration, Instant};

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        sleep(Duration::from_millis(10));
    }
    cond()
}

fn info(tensor_type: TensorType, dims: &[u32]) -> TensorsInfo {
    let mut info = TensorsInfo::new();
    info.set_count(1).unwrap();
    info.set_tensor_type(0, tensor_type).unwrap();
    info.set_tensor_dimension(0, dims).unwrap();
    info
}

fn bytes(values: &[u8]) -> TensorsData {
    let mut data = TensorsData::create(&info(TensorType::UInt8, &[4])).unwrap();
    data.set_tensor_data(0, values).unwrap();
    data
}

#[test]
fn test_unregister_waits_for_pipelines() {
    let u8x4 = info(TensorType::UInt8, &[4]);
    let reg = register_easy_filter("it_passthrough", &u8x4, &u8x4, |input, output| {
        output.set_tensor_data(0, input.tensor_data(0)?)?;
        Ok(())
    })
    .unwrap();

    let description = "appsrc name=srcx ! other/tensor,dimension=4,type=uint8 ! \
                       tensor_filter framework=custom-easy model=it_passthrough ! tensor_sink name=sinkx";
    let first = Pipeline::construct(description, None).unwrap();
    let second = Pipeline::construct(description, None).unwrap();
    assert_eq!(reg.active_count(), 2);

    assert_eq!(reg.unregister().unwrap_err().status(), Status::InvalidParameter);
    first.destroy().unwrap();
    assert_eq!(reg.unregister().unwrap_err().status(), Status::InvalidParameter);
    second.destroy().unwrap();

    assert_eq!(reg.active_count(), 0);
    reg.unregister().unwrap();
    assert_eq!(reg.unregister().unwrap_err().status(), Status::InvalidParameter);

    // The name is free again.
    let again = register_easy_filter("it_passthrough", &u8x4, &u8x4, |_, _| Ok(())).unwrap();
    again.unregister().unwrap();
}

#[test]
fn test_duplicate_name_is_rejected() {
    let reg = register_if_condition("it_dup", |_, _| Ok(true)).unwrap();
    let err = register_if_condition("it_dup", |_, _| Ok(false)).unwrap_err();
    assert_eq!(err.status(), Status::StreamsPipe);
    assert_eq!(register_if_condition("", |_, _| Ok(true)).unwrap_err().status(), Status::InvalidParameter);
    reg.unregister().unwrap();
}

#[test]
fn test_unknown_custom_name_fails_construct() {
    let err = Pipeline::construct(
        "appsrc ! other/tensor,dimension=4,type=uint8 ! tensor_filter framework=custom-easy model=it_missing ! fakesink",
        None,
    )
    .err()
    .unwrap();
    assert_eq!(err.status(), Status::StreamsPipe);
}

#[test]
fn test_easy_filter_transforms_and_drops() {
    let u8x4 = info(TensorType::UInt8, &[4]);
    let reg = register_easy_filter("it_double", &u8x4, &u8x4, |input, output| {
        let src = input.tensor_data(0)?;
        if src[0] == 0 {
            anyhow::bail!("refusing zero");
        }
        let doubled: Vec<u8> = src.iter().map(|v| v.wrapping_mul(2)).collect();
        output.set_tensor_data(0, &doubled)?;
        Ok(())
    })
    .unwrap();

    let pipeline = Pipeline::construct(
        "appsrc name=srcx ! other/tensor,dimension=4,type=uint8 ! \
         tensor_filter name=f framework=custom-easy model=it_double ! tensor_sink name=sinkx",
        None,
    )
    .unwrap();
    let src = pipeline.src_handle("srcx").unwrap();
    let received = Arc::new(Mutex::new(Vec::new()));
    let received_cb = Arc::clone(&received);
    let _sink = pipeline
        .sink_register(
            "sinkx",
            Arc::new(move |data: &TensorsData, _: &TensorsInfo| {
                received_cb.lock().unwrap().push(data.tensor_data(0).unwrap().to_vec());
            }),
        )
        .unwrap();

    pipeline.start().unwrap();
    src.input_data(bytes(&[0, 1, 2, 3]), BufferPolicy::AutoFree).unwrap();
    src.input_data(bytes(&[1, 2, 3, 4]), BufferPolicy::AutoFree).unwrap();

    assert!(wait_until(Duration::from_secs(2), || received.lock().unwrap().len() == 1));
    assert_eq!(received.lock().unwrap()[0], vec![2, 4, 6, 8]);

    // A failing call drops its buffer only; the pipeline keeps playing.
    let metrics = pipeline.metrics_snapshot().unwrap();
    let filter = metrics.iter().find(|m| m.element == "f").unwrap();
    assert_eq!(filter.buffers_dropped, 1);
    assert_ne!(pipeline.get_state().unwrap(), mlstream::PipelineState::Unknown);

    pipeline.destroy().unwrap();
    reg.unregister().unwrap();
}

#[test]
fn test_if_condition_picks_branch() {
    let reg = register_if_condition("it_first_is_even", |data, _info| {
        Ok(data.tensor_data(0)?[0] % 2 == 0)
    })
    .unwrap();

    let pipeline = Pipeline::construct(
        "appsrc name=srcx ! other/tensor,dimension=4,type=uint8 ! \
         tensor_if name=tif compared-value=CUSTOM compared-value-option=it_first_is_even \
         tif.src_0 ! tensor_sink name=then_sink \
         tif.src_1 ! tensor_sink name=else_sink",
        None,
    )
    .unwrap();
    assert_eq!(reg.active_count(), 1);

    let counter = || -> (Arc<AtomicUsize>, SinkCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let count_cb = Arc::clone(&count);
        (
            count,
            Arc::new(move |_: &TensorsData, _: &TensorsInfo| {
                count_cb.fetch_add(1, Ordering::SeqCst);
            }),
        )
    };
    let (evens, evens_cb) = counter();
    let (odds, odds_cb) = counter();
    let _then = pipeline.sink_register("then_sink", evens_cb).unwrap();
    let _else = pipeline.sink_register("else_sink", odds_cb).unwrap();

    let src = pipeline.src_handle("srcx").unwrap();
    pipeline.start().unwrap();
    for first in [2u8, 3, 4, 6, 7] {
        src.input_data(bytes(&[first, 0, 0, 0]), BufferPolicy::AutoFree).unwrap();
    }

    assert!(wait_until(Duration::from_secs(2), || {
        evens.load(Ordering::SeqCst) == 3 && odds.load(Ordering::SeqCst) == 2
    }));

    pipeline.destroy().unwrap();
    reg.unregister().unwrap();
}
