use mlstream::{BufferPolicy, Pipeline, SrcCallbacks, Status, TensorType, TensorsData, TensorsInfo};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
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

fn record_info() -> TensorsInfo {
    let mut info = TensorsInfo::new();
    info.set_count(1).unwrap();
    info.set_tensor_type(0, TensorType::UInt8).unwrap();
    info.set_tensor_dimension(0, &[4, 1, 1, 1]).unwrap();
    info
}

fn record(i: u8) -> TensorsData {
    let mut data = TensorsData::create(&record_info()).unwrap();
    data.set_tensor_data(0, &[b'a' + i, b'b' + i, b'c' + i, i]).unwrap();
    data
}

#[test]
fn test_appsrc_to_filesink_keeps_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.bin");
    let description = format!(
        "appsrc name=srcx ! other/tensor,dimension=(string)4:1:1:1,type=(string)uint8 ! filesink location={}",
        path.display()
    );
    let pipeline = Pipeline::construct(&description, None).unwrap();
    let src = pipeline.src_handle("srcx").unwrap();

    let info = src.get_tensors_info().unwrap();
    assert!(info.is_equal(&record_info()));

    pipeline.start().unwrap();

    let mut expected = Vec::new();
    let mut kept = Vec::new();
    for i in 0..10u8 {
        let data = record(i);
        expected.extend_from_slice(data.tensor_data(0).unwrap());
        if i % 2 == 0 {
            let shared = Arc::new(data);
            src.input_data(Arc::clone(&shared), BufferPolicy::DoNotFree).unwrap();
            kept.push(shared);
        } else {
            src.input_data(data, BufferPolicy::AutoFree).unwrap();
        }
    }

    assert!(wait_until(Duration::from_secs(3), || {
        std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0) == 40
    }));
    pipeline.stop().unwrap();

    let written = std::fs::read(&path).unwrap();
    assert_eq!(written, expected);

    src.release().unwrap();
    pipeline.destroy().unwrap();
    drop(kept);
}

#[test]
fn test_input_data_is_validated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("unused.bin");
    let description = format!(
        "appsrc name=srcx ! other/tensor,dimension=4:1:1:1,type=uint8 ! filesink location={}",
        path.display()
    );
    let pipeline = Pipeline::construct(&description, None).unwrap();
    let src = pipeline.src_handle("srcx").unwrap();

    let unallocated = TensorsData::create_no_alloc(&record_info()).unwrap();
    let err = src.input_data(unallocated, BufferPolicy::AutoFree).unwrap_err();
    assert_eq!(err.status(), Status::InvalidParameter);

    let mut wrong = TensorsInfo::new();
    wrong.set_count(1).unwrap();
    wrong.set_tensor_type(0, TensorType::UInt8).unwrap();
    wrong.set_tensor_dimension(0, &[8]).unwrap();
    let data = TensorsData::create(&wrong).unwrap();
    let err = src.input_data(data, BufferPolicy::AutoFree).unwrap_err();
    assert_eq!(err.status(), Status::InvalidParameter);

    pipeline.destroy().unwrap();
}

#[test]
fn test_untyped_source_reports_last_input() {
    let pipeline = Pipeline::construct("appsrc name=srcx ! fakesink", None).unwrap();
    let src = pipeline.src_handle("srcx").unwrap();

    assert_eq!(src.get_tensors_info().unwrap_err().status(), Status::StreamsPipe);
    src.input_data(record(0), BufferPolicy::AutoFree).unwrap();
    assert!(src.get_tensors_info().unwrap().is_equal(&record_info()));

    pipeline.destroy().unwrap();
}

#[test]
fn test_need_data_fires_when_queue_runs_dry() {
    let pipeline = Pipeline::construct(
        "appsrc name=srcx ! other/tensor,dimension=4:1:1:1,type=uint8 ! fakesink",
        None,
    )
    .unwrap();
    let src = pipeline.src_handle("srcx").unwrap();

    let needed = Arc::new(AtomicUsize::new(0));
    let needed_cb = Arc::clone(&needed);
    src.set_event_cb(SrcCallbacks::need_data(move |_queued| {
        needed_cb.fetch_add(1, Ordering::SeqCst);
    }))
    .unwrap();

    pipeline.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || needed.load(Ordering::SeqCst) >= 1));

    // A newer installation from another handle takes over.
    let other = pipeline.src_handle("srcx").unwrap();
    let replaced = Arc::new(AtomicUsize::new(0));
    let replaced_cb = Arc::clone(&replaced);
    other
        .set_event_cb(SrcCallbacks::need_data(move |_| {
            replaced_cb.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
    let before = needed.load(Ordering::SeqCst);
    src.input_data(record(1), BufferPolicy::AutoFree).unwrap();
    assert!(wait_until(Duration::from_secs(2), || replaced.load(Ordering::SeqCst) >= 1));
    assert_eq!(needed.load(Ordering::SeqCst), before);

    src.release().unwrap();
    other.release().unwrap();
    pipeline.destroy().unwrap();
}

#[test]
fn test_source_role_is_checked() {
    let pipeline = Pipeline::construct("videotestsrc name=vsrc ! tensor_converter ! tensor_sink name=sinkx", None).unwrap();
    assert_eq!(pipeline.src_handle("vsrc").err().unwrap().status(), Status::InvalidParameter);
    assert_eq!(pipeline.src_handle("sinkx").err().unwrap().status(), Status::InvalidParameter);
    assert_eq!(pipeline.src_handle("missing").err().unwrap().status(), Status::InvalidParameter);
    pipeline.destroy().unwrap();
}
