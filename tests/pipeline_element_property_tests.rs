use mlstream::{Pipeline, Status};

fn pipeline() -> Pipeline {
    Pipeline::construct(
        "videotestsrc name=vsrc num-buffers=2 ! videoconvert name=conv ! queue name=q ! \
         tensor_converter ! appsink name=app",
        None,
    )
    .unwrap()
}

#[test]
fn test_bool_and_integer_properties() {
    let pipeline = pipeline();
    let vsrc = pipeline.element_handle("vsrc").unwrap();

    assert!(!vsrc.get_bool("is-live").unwrap());
    vsrc.set_bool("is-live", true).unwrap();
    assert!(vsrc.get_bool("is-live").unwrap());

    assert_eq!(vsrc.get_i32("num-buffers").unwrap(), 2);
    vsrc.set_i32("num-buffers", 10).unwrap();
    assert_eq!(vsrc.get_i32("num-buffers").unwrap(), 10);
    // Underscores and dashes name the same property.
    assert_eq!(vsrc.get_i32("num_buffers").unwrap(), 10);

    vsrc.set_i64("timestamp-offset", -5_000).unwrap();
    assert_eq!(vsrc.get_i64("timestamp-offset").unwrap(), -5_000);

    let q = pipeline.element_handle("q").unwrap();
    assert_eq!(q.get_u32("max-size-buffers").unwrap(), 200);
    q.set_u32("max-size-buffers", 8).unwrap();
    assert_eq!(q.get_u32("max-size-buffers").unwrap(), 8);
    q.set_u64("max-size-time", 42).unwrap();
    assert_eq!(q.get_u64("max-size-time").unwrap(), 42);

    pipeline.destroy().unwrap();
}

#[test]
fn test_double_and_string_properties() {
    let pipeline = pipeline();
    let conv = pipeline.element_handle("conv").unwrap();
    conv.set_f64("alpha-value", 0.5).unwrap();
    assert_eq!(conv.get_f64("alpha-value").unwrap(), 0.5);
    assert_eq!(conv.set_f64("alpha-value", 2.0).unwrap_err().status(), Status::InvalidParameter);

    let vsrc = pipeline.element_handle("vsrc").unwrap();
    assert_eq!(vsrc.get_string("framerate").unwrap(), "30/1");
    vsrc.set_string("framerate", "15/1").unwrap();
    assert_eq!(vsrc.get_string("framerate").unwrap(), "15/1");

    pipeline.destroy().unwrap();
}

#[test]
fn test_type_mismatch_is_rejected() {
    let pipeline = pipeline();
    let vsrc = pipeline.element_handle("vsrc").unwrap();

    for status in [
        vsrc.get_f64("framerate").unwrap_err().status(),
        vsrc.get_string("is-live").unwrap_err().status(),
        vsrc.get_u32("num-buffers").unwrap_err().status(),
        vsrc.get_i64("num-buffers").unwrap_err().status(),
        vsrc.set_u64("num-buffers", 1).unwrap_err().status(),
        vsrc.set_bool("framerate", true).unwrap_err().status(),
        vsrc.get_bool("no-such-property").unwrap_err().status(),
    ] {
        assert_eq!(status, Status::InvalidParameter);
    }
    pipeline.destroy().unwrap();
}

#[test]
fn test_enum_accepts_32_bit_integers() {
    let pipeline = pipeline();
    let vsrc = pipeline.element_handle("vsrc").unwrap();

    assert_eq!(vsrc.get_enum("pattern").unwrap(), 0);
    vsrc.set_enum("pattern", 4).unwrap();
    assert_eq!(vsrc.get_enum("pattern").unwrap(), 4);
    assert_eq!(vsrc.get_i32("pattern").unwrap(), 4);
    assert_eq!(vsrc.get_u32("pattern").unwrap(), 4);

    vsrc.set_u32("pattern", 2).unwrap();
    assert_eq!(vsrc.get_i32("pattern").unwrap(), 2);
    vsrc.set_i32("pattern", 6).unwrap();
    assert_eq!(vsrc.get_enum("pattern").unwrap(), 6);

    // Only declared values, and only on enum properties.
    assert_eq!(vsrc.set_enum("pattern", 99).unwrap_err().status(), Status::InvalidParameter);
    assert_eq!(vsrc.set_enum("num-buffers", 1).unwrap_err().status(), Status::InvalidParameter);
    assert_eq!(vsrc.get_enum("num-buffers").unwrap_err().status(), Status::InvalidParameter);

    pipeline.destroy().unwrap();
}

#[test]
fn test_any_node_accepts_element_handle() {
    let pipeline = pipeline();
    for name in ["vsrc", "conv", "q", "tensor_converter0", "app"] {
        let handle = pipeline.element_handle(name).unwrap();
        assert_eq!(handle.name(), name);
        handle.release().unwrap();
    }
    assert_eq!(pipeline.element_handle("ghost").err().unwrap().status(), Status::InvalidParameter);
    pipeline.destroy().unwrap();
}
