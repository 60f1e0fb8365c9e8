use std::rc::Rc;

use gpi::{
    registry, Gpi, GpiConfig, GpiError, Language, ModelDesign, ModelKernel, ModelObject,
    ModelOptions, ObjectType, SetAction, SignalValue, TypeDesc,
};

fn install() -> (ModelKernel, Rc<Gpi>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let design = ModelDesign::new(vec![ModelObject::module("top")
        .child(ModelObject::constant(
            "WIDTH",
            TypeDesc::Integer,
            SignalValue::Long(8),
        ))
        .child(ModelObject::logic_vector("bus", 3, 0))
        .child(ModelObject::signal("count", TypeDesc::Integer))
        .child(ModelObject::signal("ratio", TypeDesc::Floating))
        .child(ModelObject::signal("msg", TypeDesc::Str))
        .child(ModelObject::signal("ready", TypeDesc::boolean()))]);
    let options = ModelOptions {
        language: Language::Vhdl,
        ..ModelOptions::default()
    };
    let kernel = ModelKernel::new(design, options).expect("design elaborates");
    let gpi = registry::install(Box::new(kernel.backend()), GpiConfig::default())
        .expect("first backend installs");
    (kernel, gpi)
}

#[test]
fn logic_vector_reads_back_what_was_written() {
    let (_kernel, gpi) = install();
    let bus = gpi.get_handle_by_path("top.bus").unwrap();
    assert_eq!(bus.object_type(), ObjectType::LogicArray);
    assert_eq!(gpi.read_binstr(&bus).unwrap(), "UUUU");

    gpi.write(&bus, &SignalValue::binstr("1010"), SetAction::NoDelay)
        .unwrap();
    assert_eq!(gpi.read_binstr(&bus).unwrap(), "1010");
    assert_eq!(gpi.read_long(&bus).unwrap(), 10);

    let msb = gpi.get_child_by_index(&bus, 3).unwrap();
    let lsb = gpi.get_child_by_index(&bus, 0).unwrap();
    assert_eq!(msb.fullname(), "top.bus[3]");
    assert_eq!(gpi.read_binstr(&msb).unwrap(), "1");
    assert_eq!(gpi.read_binstr(&lsb).unwrap(), "0");
    assert!(gpi.get_child_by_index(&bus, 4).is_none());
    assert!(gpi.get_child_by_index(&bus, i64::MIN).is_none());
    assert!(gpi.get_child_by_index(&bus, i64::MAX).is_none());

    gpi.write(&bus, &SignalValue::Long(5), SetAction::NoDelay)
        .unwrap();
    assert_eq!(gpi.read(&bus).unwrap(), SignalValue::binstr("0101"));
    registry::shutdown();
}

#[test]
fn deposits_land_in_the_next_write_phase() {
    let (kernel, gpi) = install();
    let bus = gpi.get_handle_by_path("top.bus").unwrap();
    gpi.write(&bus, &SignalValue::binstr("0110"), SetAction::Deposit)
        .unwrap();
    assert_eq!(gpi.read_binstr(&bus).unwrap(), "UUUU");

    kernel.run_until(0);
    assert_eq!(gpi.read_binstr(&bus).unwrap(), "0110");
    registry::shutdown();
}

#[test]
fn force_holds_until_release() {
    let (kernel, gpi) = install();
    let bus = gpi.get_handle_by_path("top.bus").unwrap();

    gpi.write(&bus, &SignalValue::binstr("1111"), SetAction::Force)
        .unwrap();
    gpi.write(&bus, &SignalValue::binstr("0000"), SetAction::NoDelay)
        .unwrap();
    assert_eq!(gpi.read_binstr(&bus).unwrap(), "1111");

    gpi.write(&bus, &SignalValue::binstr("0000"), SetAction::Release)
        .unwrap();
    assert_eq!(gpi.read_binstr(&bus).unwrap(), "1111");

    gpi.write(&bus, &SignalValue::binstr("0011"), SetAction::NoDelay)
        .unwrap();
    assert_eq!(kernel.value_of("top.bus"), Some(SignalValue::binstr("0011")));

    let bit = gpi.get_child_by_index(&bus, 1).unwrap();
    let err = gpi
        .write(&bit, &SignalValue::binstr("0"), SetAction::Force)
        .unwrap_err();
    assert!(err.is_native(), "{err}");
    registry::shutdown();
}

#[test]
fn scalar_encodings() {
    let (_kernel, gpi) = install();

    let count = gpi.get_handle_by_path("top.count").unwrap();
    gpi.write(&count, &SignalValue::Long(-5), SetAction::NoDelay)
        .unwrap();
    assert_eq!(gpi.read_long(&count).unwrap(), -5);
    assert_eq!(
        gpi.read_binstr(&count).unwrap(),
        "11111111111111111111111111111011"
    );

    let ratio = gpi.get_handle_by_path("top.ratio").unwrap();
    assert_eq!(ratio.object_type(), ObjectType::Real);
    gpi.write(&ratio, &SignalValue::Real(0.25), SetAction::NoDelay)
        .unwrap();
    assert!((gpi.read_real(&ratio).unwrap() - 0.25).abs() < f64::EPSILON);

    let msg = gpi.get_handle_by_path("top.msg").unwrap();
    assert_eq!(msg.object_type(), ObjectType::String);
    gpi.write(&msg, &SignalValue::Str(b"hello".to_vec()), SetAction::NoDelay)
        .unwrap();
    assert_eq!(gpi.read_string(&msg).unwrap(), b"hello");

    let ready = gpi.get_handle_by_path("top.ready").unwrap();
    assert_eq!(ready.object_type(), ObjectType::Integer);
    gpi.write(&ready, &SignalValue::Long(1), SetAction::NoDelay)
        .unwrap();
    assert_eq!(gpi.read_binstr(&ready).unwrap(), "1");
    registry::shutdown();
}

#[test]
fn inapplicable_accessors_fail_without_side_effects() {
    let (kernel, gpi) = install();
    let bus = gpi.get_handle_by_path("top.bus").unwrap();
    let ratio = gpi.get_handle_by_path("top.ratio").unwrap();

    assert!(gpi.read_real(&bus).unwrap_err().is_unsupported());
    assert!(gpi.read_string(&bus).unwrap_err().is_unsupported());
    assert!(gpi.read_binstr(&ratio).unwrap_err().is_unsupported());
    assert!(gpi
        .write(&ratio, &SignalValue::Long(3), SetAction::NoDelay)
        .unwrap_err()
        .is_unsupported());

    let top = gpi.get_root(None).unwrap();
    assert!(gpi.read_long(&top).unwrap_err().is_unsupported());

    let err = gpi
        .write(&bus, &SignalValue::binstr("101"), SetAction::NoDelay)
        .unwrap_err();
    assert!(matches!(err, GpiError::InvalidValue { .. }), "{err}");
    let err = gpi
        .write(&bus, &SignalValue::binstr("10q1"), SetAction::NoDelay)
        .unwrap_err();
    assert!(matches!(err, GpiError::InvalidValue { .. }), "{err}");
    assert_eq!(kernel.value_of("top.bus"), Some(SignalValue::binstr("UUUU")));
    registry::shutdown();
}

#[test]
fn constants_are_read_only() {
    let (kernel, gpi) = install();
    let width = gpi.get_handle_by_path("top.WIDTH").unwrap();
    assert!(width.is_const());
    assert_eq!(gpi.read_long(&width).unwrap(), 8);

    let err = gpi
        .write(&width, &SignalValue::Long(1), SetAction::NoDelay)
        .unwrap_err();
    assert!(matches!(err, GpiError::ReadOnly { ref name } if name == "top.WIDTH"));
    assert_eq!(kernel.value_of("top.WIDTH"), Some(SignalValue::Long(8)));
    registry::shutdown();
}

#[test]
fn simulation_time_splits_into_words() {
    let (kernel, gpi) = install();
    kernel.run_until((1 << 32) + 7);
    assert_eq!(gpi.get_sim_time(), (1, 7));
    assert_eq!(gpi.sim_time(), (1 << 32) + 7);
    assert_eq!(gpi.get_sim_precision(), -12);
    assert_eq!(gpi.product().product, "gpi-model");
    registry::shutdown();
}
