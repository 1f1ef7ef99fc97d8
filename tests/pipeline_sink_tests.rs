use mlstream::{BufferPolicy, Pipeline, SinkCallback, Status, TensorType, TensorsData, TensorsInfo};
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

fn counter() -> (Arc<AtomicUsize>, SinkCallback) {
    let count = Arc::new(AtomicUsize::new(0));
    let count_cb = Arc::clone(&count);
    let cb: SinkCallback = Arc::new(move |_data: &TensorsData, _info: &TensorsInfo| {
        count_cb.fetch_add(1, Ordering::SeqCst);
    });
    (count, cb)
}

fn frame() -> TensorsData {
    let mut info = TensorsInfo::new();
    info.set_count(1).unwrap();
    info.set_tensor_type(0, TensorType::UInt8).unwrap();
    info.set_tensor_dimension(0, &[4]).unwrap();
    let mut data = TensorsData::create(&info).unwrap();
    data.set_tensor_data(0, &[1, 2, 3, 4]).unwrap();
    data
}

#[test]
fn test_sink_receives_negotiated_tensors() {
    let pipeline = Pipeline::construct(
        "videotestsrc num-buffers=3 ! videoconvert ! video/x-raw,format=RGB,width=4,height=2 ! \
         tensor_converter ! tensor_sink name=sinkx",
        None,
    )
    .unwrap();

    let infos = Arc::new(Mutex::new(Vec::new()));
    let infos_cb = Arc::clone(&infos);
    let sink = pipeline
        .sink_register(
            "sinkx",
            Arc::new(move |data: &TensorsData, info: &TensorsInfo| {
                assert_eq!(data.count(), info.count());
                infos_cb.lock().unwrap().push(info.clone());
            }),
        )
        .unwrap();

    pipeline.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || infos.lock().unwrap().len() == 3));

    let info = infos.lock().unwrap()[0].clone();
    assert_eq!(info.tensor_type(0).unwrap(), TensorType::UInt8);
    assert_eq!(info.tensor_dimension(0).unwrap(), &[3, 4, 2, 1]);

    sink.unregister().unwrap();
    assert_eq!(sink.unregister().unwrap_err().status(), Status::InvalidParameter);
    pipeline.destroy().unwrap();
}

#[test]
fn test_duplicate_registrations_are_independent() {
    let pipeline = Pipeline::construct(
        "appsrc name=srcx ! other/tensor,dimension=4,type=uint8 ! tensor_sink name=sinkx",
        None,
    )
    .unwrap();
    let src = pipeline.src_handle("srcx").unwrap();
    let (first, first_cb) = counter();
    let (second, second_cb) = counter();
    let sink1 = pipeline.sink_register("sinkx", first_cb).unwrap();
    let sink2 = pipeline.sink_register("sinkx", second_cb).unwrap();

    pipeline.start().unwrap();
    src.input_data(frame(), BufferPolicy::AutoFree).unwrap();
    assert!(wait_until(Duration::from_secs(2), || {
        first.load(Ordering::SeqCst) == 1 && second.load(Ordering::SeqCst) == 1
    }));

    sink1.unregister().unwrap();
    src.input_data(frame(), BufferPolicy::AutoFree).unwrap();
    assert!(wait_until(Duration::from_secs(2), || second.load(Ordering::SeqCst) == 2));
    sleep(Duration::from_millis(50));
    assert_eq!(first.load(Ordering::SeqCst), 1);

    sink2.unregister().unwrap();
    pipeline.destroy().unwrap();
}

#[test]
fn test_appsink_registration_enables_signals() {
    let pipeline = Pipeline::construct("videotestsrc num-buffers=2 ! appsink name=app", None).unwrap();
    let (count, cb) = counter();
    let _sink = pipeline.sink_register("app", cb).unwrap();

    let element = pipeline.element_handle("app").unwrap();
    assert!(element.get_bool("emit-signals").unwrap());

    pipeline.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || count.load(Ordering::SeqCst) == 2));
    pipeline.destroy().unwrap();
}

#[test]
fn test_sink_role_is_checked() {
    let pipeline = Pipeline::construct("videotestsrc ! valve name=v ! fakesink name=fake", None).unwrap();
    let (_, cb) = counter();
    assert_eq!(
        pipeline.sink_register("fake", Arc::clone(&cb)).err().unwrap().status(),
        Status::InvalidParameter
    );
    assert_eq!(
        pipeline.sink_register("v", Arc::clone(&cb)).err().unwrap().status(),
        Status::InvalidParameter
    );
    assert_eq!(
        pipeline.sink_register("nothing", cb).err().unwrap().status(),
        Status::InvalidParameter
    );
    pipeline.destroy().unwrap();
}

#[test]
fn test_callback_may_toggle_valve() {
    let pipeline = Pipeline::construct(
        "videotestsrc num-buffers=10 ! tensor_converter ! valve name=v ! tensor_sink name=sinkx",
        None,
    )
    .unwrap();
    let valve = Arc::new(pipeline.valve_handle("v").unwrap());
    let valve_cb = Arc::clone(&valve);
    let count = Arc::new(AtomicUsize::new(0));
    let count_cb = Arc::clone(&count);
    let _sink = pipeline
        .sink_register(
            "sinkx",
            Arc::new(move |_: &TensorsData, _: &TensorsInfo| {
                count_cb.fetch_add(1, Ordering::SeqCst);
                valve_cb.set_open(false).unwrap();
            }),
        )
        .unwrap();

    pipeline.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || count.load(Ordering::SeqCst) >= 1));
    sleep(Duration::from_millis(100));
    assert!(!valve.is_open().unwrap());
    pipeline.destroy().unwrap();
}

#[test]
fn test_flexible_stream_carries_per_buffer_info() {
    let pipeline = Pipeline::construct(
        "appsrc name=srcx ! other/tensors,format=flexible ! tensor_sink name=sinkx",
        None,
    )
    .unwrap();
    let src = pipeline.src_handle("srcx").unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_cb = Arc::clone(&seen);
    let _sink = pipeline
        .sink_register(
            "sinkx",
            Arc::new(move |data: &TensorsData, info: &TensorsInfo| {
                assert_eq!(data.count(), info.count());
                let types: Vec<TensorType> = (0..info.count()).map(|i| info.tensor_type(i).unwrap()).collect();
                seen_cb.lock().unwrap().push(types);
            }),
        )
        .unwrap();

    let mut two = TensorsInfo::new();
    two.set_count(2).unwrap();
    two.set_tensor_type(0, TensorType::Int16).unwrap();
    two.set_tensor_dimension(0, &[3]).unwrap();
    two.set_tensor_type(1, TensorType::Float32).unwrap();
    two.set_tensor_dimension(1, &[2, 2]).unwrap();

    pipeline.start().unwrap();
    src.input_data(frame(), BufferPolicy::AutoFree).unwrap();
    src.input_data(TensorsData::create(&two).unwrap(), BufferPolicy::AutoFree).unwrap();

    assert!(wait_until(Duration::from_secs(2), || seen.lock().unwrap().len() == 2));
    let seen = seen.lock().unwrap();
    assert_eq!(seen[0], vec![TensorType::UInt8]);
    assert_eq!(seen[1], vec![TensorType::Int16, TensorType::Float32]);
    drop(seen);

    // The source reports the layout of its latest push.
    assert!(src.get_tensors_info().unwrap().is_equal(&two));
    pipeline.destroy().unwrap();
}

#[test]
fn test_destroy_waits_for_inflight_callback() {
    use std::sync::atomic::AtomicBool;

    let pipeline = Pipeline::construct(
        "videotestsrc num-buffers=1 ! video/x-raw,format=RGB,width=4,height=4 ! tensor_converter ! \
         tensor_sink name=sinkx",
        None,
    )
    .unwrap();

    let entered = Arc::new(AtomicBool::new(false));
    let done = Arc::new(AtomicBool::new(false));
    let (entered_cb, done_cb) = (Arc::clone(&entered), Arc::clone(&done));
    let _sink = pipeline
        .sink_register(
            "sinkx",
            Arc::new(move |_: &TensorsData, _: &TensorsInfo| {
                entered_cb.store(true, Ordering::SeqCst);
                // Longer than the default shutdown timeout.
                sleep(Duration::from_millis(1500));
                done_cb.store(true, Ordering::SeqCst);
            }),
        )
        .unwrap();

    pipeline.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || entered.load(Ordering::SeqCst)));
    assert!(!done.load(Ordering::SeqCst));

    pipeline.destroy().unwrap();
    assert!(done.load(Ordering::SeqCst));
}
