use mlstream::{Pipeline, Status};
use std::thread::sleep;
use std::time::Duration;

const FRAME_SIZE: u64 = 16 * 16 * 4;

fn file_size(path: &std::path::Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

#[test]
fn test_valve_gates_dataflow() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("valve.bin");
    let description = format!(
        "videotestsrc is-live=true ! videoconvert ! video/x-raw,format=RGBx,width=16,height=16,framerate=10/1 ! \
         tensor_converter ! valve name=valve1 ! filesink location={}",
        path.display()
    );
    let pipeline = Pipeline::construct(&description, None).unwrap();
    let valve = pipeline.valve_handle("valve1").unwrap();

    valve.set_open(false).unwrap();
    pipeline.start().unwrap();
    sleep(Duration::from_millis(300));
    assert_eq!(file_size(&path), 0);

    valve.set_open(true).unwrap();
    assert!(valve.is_open().unwrap());
    sleep(Duration::from_millis(500));
    pipeline.stop().unwrap();
    sleep(Duration::from_millis(100));

    // About five frames at 10 fps; allow for scheduling jitter.
    let size = file_size(&path);
    assert!(size >= FRAME_SIZE, "only {} bytes written", size);
    assert!(size <= 10 * FRAME_SIZE, "{} bytes written", size);
    assert_eq!(size % FRAME_SIZE, 0);

    valve.release().unwrap();
    pipeline.destroy().unwrap();
}

#[test]
fn test_valve_role_is_checked() {
    let pipeline = Pipeline::construct(
        "videotestsrc name=vsrc ! tensor_converter ! valve name=valvex ! tensor_sink name=sinkx",
        None,
    )
    .unwrap();

    assert_eq!(pipeline.valve_handle("sinkx").err().unwrap().status(), Status::InvalidParameter);
    assert_eq!(pipeline.valve_handle("vsrc").err().unwrap().status(), Status::InvalidParameter);
    assert_eq!(pipeline.valve_handle("").err().unwrap().status(), Status::InvalidParameter);

    let valve = pipeline.valve_handle("valvex").unwrap();
    valve.release().unwrap();
    assert_eq!(valve.release().unwrap_err().status(), Status::InvalidParameter);
    assert_eq!(valve.set_open(true).unwrap_err().status(), Status::InvalidParameter);
    pipeline.destroy().unwrap();
}
