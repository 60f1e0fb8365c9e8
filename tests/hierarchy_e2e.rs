use std::rc::Rc;

use gpi::{
    registry, GenerateLookup, Gpi, GpiConfig, IndexRange, IterItem, Language, ModelDesign,
    ModelKernel, ModelObject, ModelOptions, ObjectType, SignalValue, TypeDesc,
};

fn loop_elements() -> Vec<ModelObject> {
    (0..4)
        .map(|i| {
            ModelObject::generate_scope(format!("loop[{i}]"))
                .child(ModelObject::net("sig", TypeDesc::std_logic()))
        })
        .collect()
}

/// `top` holds a parameter, a net, a reg, a four-element generate loop and a sub-instance.
/// Backends with a native generate-array object hold the elements inside it.
fn design(lookup: GenerateLookup) -> ModelDesign {
    let mut top = ModelObject::module("top")
        .child(ModelObject::constant("WIDTH", TypeDesc::Integer, SignalValue::Long(8)))
        .child(ModelObject::net("clk", TypeDesc::std_logic()))
        .child(ModelObject::reg("state", TypeDesc::Integer));
    top = match lookup {
        GenerateLookup::Native => {
            top.child(ModelObject::generate_array("loop").with_children(loop_elements()))
        }
        GenerateLookup::AliasFirst | GenerateLookup::Fail => top.with_children(loop_elements()),
    };
    ModelDesign::new(vec![top.child(ModelObject::module("sub"))])
}

fn install(design: ModelDesign, options: ModelOptions) -> (ModelKernel, Rc<Gpi>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let kernel = ModelKernel::new(design, options).expect("design elaborates");
    let gpi = registry::install(Box::new(kernel.backend()), GpiConfig::default())
        .expect("first backend installs");
    (kernel, gpi)
}

fn names(items: impl Iterator<Item = IterItem>) -> Vec<String> {
    items
        .map(|item| match item {
            IterItem::Native(h) => h.fullname().to_string(),
            IterItem::NativeNoName(h) => format!("<unnamed in {}>", h.fullname()),
            IterItem::NotNative { name, .. } => format!("<foreign {name}>"),
            IterItem::NotNativeNoName(_) => "<foreign>".to_string(),
        })
        .collect()
}

fn check_generate_loop(lookup: GenerateLookup) {
    let options = ModelOptions {
        generate_lookup: lookup,
        ..ModelOptions::default()
    };
    let (_kernel, gpi) = install(design(lookup), options);
    let top = gpi.get_root(Some("top")).expect("root");

    let array = gpi.get_child_by_name(&top, "loop").expect("loop resolves");
    assert_eq!(array.object_type(), ObjectType::GenArray, "{lookup:?}");
    assert_eq!(array.native(), top.native(), "{lookup:?}");
    assert_eq!(array.fullname(), "top.loop");
    assert_eq!(array.range(), Some(IndexRange::from_bounds(0, 3)), "{lookup:?}");
    assert_eq!(array.num_elems(), 4);

    let second = gpi.get_child_by_index(&array, 2).expect("loop[2] resolves");
    assert_eq!(second.object_type(), ObjectType::Module, "{lookup:?}");
    assert_eq!(second.fullname(), "top.loop[2]");
    assert_ne!(second.native(), top.native());

    let by_name = gpi.get_child_by_name(&array, "loop[2]").expect("indexed name resolves");
    assert!(Rc::ptr_eq(&by_name, &second), "same object, same handle");
    assert!(gpi.get_child_by_index(&array, 4).is_none());

    let sig = gpi.get_handle_by_path("top.loop[3].sig").expect("path resolves");
    assert_eq!(sig.fullname(), "top.loop[3].sig");
    assert_eq!(sig.object_type(), ObjectType::Net);

    let elements = names(gpi.children(&array));
    assert_eq!(
        elements,
        ["top.loop[0]", "top.loop[1]", "top.loop[2]", "top.loop[3]"],
        "{lookup:?}"
    );

    registry::shutdown();
}

#[test]
fn generate_loop_with_native_array_object() {
    check_generate_loop(GenerateLookup::Native);
}

#[test]
fn generate_loop_when_unindexed_name_aliases_first_element() {
    check_generate_loop(GenerateLookup::AliasFirst);
}

#[test]
fn generate_loop_when_unindexed_name_is_unknown() {
    check_generate_loop(GenerateLookup::Fail);
}

#[test]
fn scope_children_follow_relation_order() {
    for lookup in [GenerateLookup::Native, GenerateLookup::AliasFirst, GenerateLookup::Fail] {
        let options = ModelOptions {
            generate_lookup: lookup,
            ..ModelOptions::default()
        };
        let (_kernel, gpi) = install(design(lookup), options);
        let top = gpi.get_root(None).unwrap();
        let children = names(gpi.children(&top));
        assert_eq!(
            children,
            ["top.WIDTH", "top.clk", "top.state", "top.loop", "top.sub"],
            "{lookup:?}"
        );
        registry::shutdown();
    }
}

#[test]
fn array_of_records_yields_elements_then_members() {
    let record = TypeDesc::Record { packed: false };
    let regs = ModelObject::signal("regs", TypeDesc::array(record, IndexRange::from_bounds(0, 1)))
        .with_children([
            ModelObject::signal("valid", TypeDesc::std_logic()),
            ModelObject::signal("count", TypeDesc::Integer),
        ]);
    let design = ModelDesign::new(vec![ModelObject::module("top").child(regs)]);
    let options = ModelOptions {
        language: Language::Vhdl,
        ..ModelOptions::default()
    };
    let (_kernel, gpi) = install(design, options);

    let regs = gpi.get_handle_by_path("top.regs").unwrap();
    assert_eq!(regs.object_type(), ObjectType::Array);
    let elements = names(gpi.children(&regs));
    assert_eq!(elements, ["top.regs[0]", "top.regs[1]"]);

    let second = gpi.get_child_by_index(&regs, 1).unwrap();
    assert_eq!(second.object_type(), ObjectType::Structure);
    let members = names(gpi.children(&second));
    assert_eq!(members, ["top.regs[1].valid", "top.regs[1].count"]);

    let count = gpi.get_child_by_name(&second, "count").unwrap();
    assert_eq!(count.object_type(), ObjectType::Integer);
    registry::shutdown();
}

#[test]
fn foreign_and_unnamed_children_are_reported_not_dropped() {
    let top = ModelObject::module("top")
        .child(ModelObject::net("anon", TypeDesc::std_logic()).unnamed())
        .child(ModelObject::module("vhdl_core").with_language(Language::Vhdl))
        .child(
            ModelObject::module("hidden")
                .with_language(Language::Vhdl)
                .unnamed(),
        );
    let (kernel, gpi) = install(ModelDesign::new(vec![top]), ModelOptions::default());
    let top = gpi.get_root(None).unwrap();

    let mut items: Vec<IterItem> = gpi.children(&top).collect();
    assert_eq!(items.len(), 3);
    assert!(matches!(&items[1], IterItem::NotNative { name, .. } if name == "vhdl_core"));
    assert!(matches!(items[2], IterItem::NotNativeNoName(_)));
    let anon = match items.swap_remove(0) {
        IterItem::NativeNoName(h) => h,
        other => panic!("expected an unnamed native child, got {other:?}"),
    };
    assert_eq!(anon.name(), "");
    assert_eq!(anon.fullname(), "top");
    assert_eq!(anon.object_type(), ObjectType::Net);

    // The unnamed child must not displace its parent in the handle cache.
    let again = gpi.get_root(Some("top")).unwrap();
    assert!(Rc::ptr_eq(&again, &top));
    let anon_native = anon.native();
    gpi.release_handle(anon);
    assert_eq!(kernel.released(), [anon_native]);
    assert!(Rc::ptr_eq(&gpi.get_root(Some("top")).unwrap(), &top));

    assert!(gpi.get_child_by_name(&top, "vhdl_core").is_none());
    registry::shutdown();
}

#[test]
fn missing_children_are_not_found_rather_than_errors() {
    let (_kernel, gpi) = install(design(GenerateLookup::Native), ModelOptions::default());
    let top = gpi.get_root(None).unwrap();
    assert!(gpi.get_child_by_name(&top, "nope").is_none());
    assert!(gpi.get_handle_by_path("top.sub.deeper").is_none());
    assert!(gpi.get_root(Some("elsewhere")).is_none());

    let clk = gpi.get_child_by_name(&top, "clk").unwrap();
    assert!(gpi.get_child_by_index(&clk, 0).is_none());
    registry::shutdown();
}

#[test]
fn handles_are_shared_until_released() {
    let (kernel, gpi) = install(design(GenerateLookup::Native), ModelOptions::default());
    let top = gpi.get_root(None).unwrap();
    let a = gpi.get_child_by_name(&top, "clk").unwrap();
    let b = gpi.get_handle_by_path("top.clk").unwrap();
    assert!(Rc::ptr_eq(&a, &b));
    let native = a.native();
    gpi.release_handle(a);
    assert!(kernel.released().is_empty());
    gpi.release_handle(b);
    assert_eq!(kernel.released(), [native]);

    let again = gpi.get_child_by_name(&top, "clk").unwrap();
    assert_eq!(again.fullname(), "top.clk");
    registry::shutdown();
}

#[test]
fn generate_region_keeps_the_shared_native_reference_alive() {
    for lookup in [GenerateLookup::Native, GenerateLookup::AliasFirst, GenerateLookup::Fail] {
        let options = ModelOptions {
            generate_lookup: lookup,
            ..ModelOptions::default()
        };
        let (kernel, gpi) = install(design(lookup), options);
        let top = gpi.get_root(None).unwrap();
        let array = gpi.get_child_by_name(&top, "loop").unwrap();
        let native = top.native();

        gpi.release_handle(top);
        assert!(kernel.released().is_empty(), "{lookup:?}");
        gpi.release_handle(array);
        assert_eq!(kernel.released(), [native], "{lookup:?}");
        registry::shutdown();
    }
}

#[test]
fn second_backend_is_rejected() {
    let (kernel, _gpi) = install(design(GenerateLookup::Native), ModelOptions::default());
    let err = registry::install(Box::new(kernel.backend()), GpiConfig::default())
        .err()
        .expect("second install is refused");
    assert!(matches!(err, gpi::GpiError::BackendAlreadyActive { .. }));
    registry::shutdown();
    assert!(registry::active().is_none());
}
