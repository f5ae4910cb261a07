//! End-to-end synchronization between component bindings, on one page and
//! across tabs.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use pretty_assertions::assert_eq;
use serde_json::json;
use stored_settings::{
    ChangeBus, ComponentBinding, Codec, Kind, MemoryOrigin, MemoryStorage, SettingSpec, SettingsDecl,
    StorageBackend, StoredSettings, Value,
};

fn counter_decl() -> SettingsDecl {
    SettingsDecl::new().with("count", SettingSpec::of(Kind::Integer).default_value(0))
}

#[test]
fn integer_setting_scenario() {
    let bus = ChangeBus::new();
    let storage = Rc::new(MemoryStorage::new());
    let settings = StoredSettings::new(Some("ui"), counter_decl(), storage.clone(), &bus).unwrap();

    assert_eq!(settings.read("count").unwrap(), Value::Integer(0));

    let first = settings.provide_defaults();
    let second = settings.provide_defaults();
    let _a = settings.on_create(&first).unwrap();
    let _b = settings.on_create(&second).unwrap();

    let heard = Rc::new(RefCell::new(Vec::new()));
    let h = Rc::clone(&heard);
    let _watch = second
        .get("count")
        .unwrap()
        .watch(false, move |v| h.borrow_mut().push(v.clone()));

    settings.writer("count").unwrap().write(&Value::Integer(5)).unwrap();

    assert_eq!(storage.get_item("ui.count").as_deref(), Some("5"));
    assert_eq!(second.get("count").unwrap().get(), Value::Integer(5));
    assert_eq!(first.get("count").unwrap().get(), Value::Integer(5));
    assert_eq!(*heard.borrow(), vec![Value::Integer(5)]);
}

#[test]
fn field_edit_propagates_without_extra_writes() {
    let bus = ChangeBus::new();
    let storage = Rc::new(MemoryStorage::new());
    let settings = StoredSettings::new(Some("ui"), counter_decl(), storage.clone(), &bus).unwrap();

    let a = settings.provide_defaults();
    let b = settings.provide_defaults();
    let _ba = settings.on_create(&a).unwrap();
    let _bb = settings.on_create(&b).unwrap();

    a.get("count").unwrap().set(Value::Integer(7));

    assert_eq!(b.get("count").unwrap().get(), Value::Integer(7));
    assert_eq!(storage.write_count(), 1, "b must not write the value back");
}

#[test]
fn list_update_is_in_place_and_skips_storage() {
    let bus = ChangeBus::new();
    let origin = MemoryOrigin::new();
    let storage_a = Rc::new(origin.context());
    let storage_b = Rc::new(origin.context());
    let decl = || SettingsDecl::new().with("recent", Kind::List);

    // Both bindings live on the same page but read through separate handles
    // so storage traffic can be attributed.
    let settings_a = StoredSettings::new(Some("app"), decl(), storage_a.clone(), &bus).unwrap();
    let settings_b = StoredSettings::new(Some("app"), decl(), storage_b.clone(), &bus).unwrap();

    let data_a = settings_a.provide_defaults();
    let data_b = settings_b.provide_defaults();
    let _ba = settings_a.on_create(&data_a).unwrap();
    let _bb = settings_b.on_create(&data_b).unwrap();

    let field_b = data_b.get("recent").unwrap().clone();
    field_b.set(Value::List(vec![json!(0), json!(0), json!(0)]));
    let reads_before = storage_b.read_count();
    let writes_before = storage_b.write_count();
    let ptr_before = field_b.with(|v| v.as_list().map(|l| l.as_ptr()));

    data_a
        .get("recent")
        .unwrap()
        .set(Value::List(vec![json!(1), json!(2), json!(3)]));

    assert_eq!(
        field_b.get(),
        Value::List(vec![json!(1), json!(2), json!(3)])
    );
    assert!(field_b.ptr_eq(data_b.get("recent").unwrap()));
    assert_eq!(field_b.with(|v| v.as_list().map(|l| l.as_ptr())), ptr_before);
    assert_eq!(storage_b.read_count(), reads_before);
    assert_eq!(storage_b.write_count(), writes_before);
}

#[test]
fn remote_change_updates_other_tab() {
    let origin = MemoryOrigin::new();
    let seed = origin.context();
    seed.set_item("app.tags", r#"["z"]"#).unwrap();
    origin.dispatch_pending();

    let tab1 = Rc::new(origin.context());
    let tab2 = Rc::new(origin.context());
    let bus1 = ChangeBus::new();
    let bus2 = ChangeBus::new();

    let decl = || {
        SettingsDecl::new()
            .with("theme", SettingSpec::of(Kind::Text).default_value("light"))
            .with("tags", Kind::List)
    };
    let s1 = StoredSettings::new(Some("app"), decl(), tab1.clone(), &bus1).unwrap();
    let s2 = StoredSettings::new(Some("app"), decl(), tab2.clone(), &bus2).unwrap();
    let d1 = s1.provide_defaults();
    let d2 = s2.provide_defaults();
    let _b1 = s1.on_create(&d1).unwrap();
    let _b2 = s2.on_create(&d2).unwrap();

    let tags2 = d2.get("tags").unwrap().clone();
    let ptr_before = tags2.with(|v| v.as_list().map(|l| l.as_ptr()));

    d1.get("theme").unwrap().set(Value::from("dark"));
    d1.get("tags").unwrap().set(Value::List(vec![json!("a")]));
    assert_eq!(d2.get("theme").unwrap().get(), Value::from("light"));

    origin.dispatch_pending();

    assert_eq!(d2.get("theme").unwrap().get(), Value::from("dark"));
    assert_eq!(tags2.get(), Value::List(vec![json!("a")]));
    assert!(tags2.ptr_eq(d2.get("tags").unwrap()));
    assert_eq!(tags2.with(|v| v.as_list().map(|l| l.as_ptr())), ptr_before);
    assert_eq!(tab2.write_count(), 0, "remote values are not written back");
    assert_eq!(origin.pending(), 0);
}

#[test]
fn dependent_field_edit_during_apply_is_synced() {
    let bus = ChangeBus::new();
    let storage = Rc::new(MemoryStorage::new());
    let decl = SettingsDecl::new()
        .with("count", SettingSpec::of(Kind::Integer).default_value(0))
        .with("doubled", SettingSpec::of(Kind::Integer).default_value(0));
    let settings = StoredSettings::new(Some("ui"), decl, storage.clone(), &bus).unwrap();

    let a = settings.provide_defaults();
    let b = settings.provide_defaults();
    let _ba = settings.on_create(&a).unwrap();
    let _bb = settings.on_create(&b).unwrap();

    let doubled = b.get("doubled").unwrap().clone();
    let _derive = b.get("count").unwrap().watch(false, move |v| {
        if let Some(n) = v.as_integer() {
            doubled.set(Value::Integer(n * 2));
        }
    });

    a.get("count").unwrap().set(Value::Integer(5));

    assert_eq!(b.get("doubled").unwrap().get(), Value::Integer(10));
    assert_eq!(storage.get_item("ui.doubled").as_deref(), Some("10"));
    assert_eq!(a.get("doubled").unwrap().get(), Value::Integer(10));
    assert_eq!(storage.write_count(), 2);
}

#[test]
fn clamped_remote_value_is_written_back() {
    let origin = MemoryOrigin::new();
    let tab1 = Rc::new(origin.context());
    let tab2 = Rc::new(origin.context());
    let s1 =
        StoredSettings::new(Some("ui"), counter_decl(), tab1.clone(), &ChangeBus::new()).unwrap();
    let s2 =
        StoredSettings::new(Some("ui"), counter_decl(), tab2.clone(), &ChangeBus::new()).unwrap();
    let d1 = s1.provide_defaults();
    let d2 = s2.provide_defaults();
    let _b1 = s1.on_create(&d1).unwrap();
    let _b2 = s2.on_create(&d2).unwrap();

    let count2 = d2.get("count").unwrap().clone();
    let _clamp = d2.get("count").unwrap().watch(false, move |v| {
        if v.as_integer().is_some_and(|n| n > 10) {
            count2.set(Value::Integer(10));
        }
    });

    d1.get("count").unwrap().set(Value::Integer(50));
    origin.dispatch_pending();

    assert_eq!(d2.get("count").unwrap().get(), Value::Integer(10));
    assert_eq!(origin.peek("ui.count").as_deref(), Some("10"));
    assert_eq!(d1.get("count").unwrap().get(), Value::Integer(10));
}

#[test]
fn binding_destroyed_mid_publish_is_not_updated() {
    let bus = ChangeBus::new();
    let storage = Rc::new(MemoryStorage::new());
    let settings = StoredSettings::new(Some("ui"), counter_decl(), storage, &bus).unwrap();
    let a = settings.provide_defaults();
    let b = settings.provide_defaults();
    let _ba = settings.on_create(&a).unwrap();

    let slot: Rc<RefCell<Option<ComponentBinding>>> = Rc::new(RefCell::new(None));
    let teardown = Rc::clone(&slot);
    let _listener = bus.subscribe("ui.count", move |_| {
        let binding = teardown.borrow_mut().take();
        drop(binding);
    });
    *slot.borrow_mut() = Some(settings.on_create(&b).unwrap());

    a.get("count").unwrap().set(Value::Integer(5));

    assert!(slot.borrow().is_none());
    assert_eq!(b.get("count").unwrap().get(), Value::Integer(0));
}

#[test]
fn remote_change_equal_to_current_is_dropped() {
    let origin = MemoryOrigin::new();
    let tab1 = origin.context();
    let tab2 = Rc::new(origin.context());
    let bus = ChangeBus::new();
    let settings = StoredSettings::new(None, counter_decl(), tab2.clone(), &bus).unwrap();
    let data = settings.provide_defaults();
    let _binding = settings.on_create(&data).unwrap();

    let field = data.get("count").unwrap();
    field.set(Value::Integer(3));
    let writes = tab2.write_count();
    let version = field.version();

    tab1.set_item("count", "3").unwrap();
    tab1.set_item("count", "03").unwrap();
    origin.dispatch_pending();

    assert_eq!(field.version(), version);
    assert_eq!(tab2.write_count(), writes);
}

#[test]
fn unrelated_remote_keys_are_ignored() {
    let origin = MemoryOrigin::new();
    let other = origin.context();
    let mine = Rc::new(origin.context());
    let settings =
        StoredSettings::new(Some("ui"), counter_decl(), mine.clone(), &ChangeBus::new()).unwrap();
    let data = settings.provide_defaults();
    let _binding = settings.on_create(&data).unwrap();

    other.set_item("count", "9").unwrap();
    other.set_item("ui.counter", "9").unwrap();
    other.clear();
    origin.dispatch_pending();

    assert_eq!(data.get("count").unwrap().get(), Value::Integer(0));
}

#[test]
fn remote_removal_parses_empty_string() {
    let origin = MemoryOrigin::new();
    let other = origin.context();
    let mine = Rc::new(origin.context());
    let settings = StoredSettings::new(
        None,
        SettingsDecl::new().with("flags", Kind::Map),
        mine.clone(),
        &ChangeBus::new(),
    )
    .unwrap();
    other.set_item("flags", r#"{"beta":true}"#).unwrap();
    let data = settings.provide_defaults();
    let _binding = settings.on_create(&data).unwrap();
    assert_eq!(data.get("flags").unwrap().get().as_map().map(|m| m.len()), Some(1));

    other.remove_item("flags");
    origin.dispatch_pending();
    assert_eq!(data.get("flags").unwrap().get(), Value::empty_map());
}

#[test]
fn deep_map_edits_are_written_back() {
    let bus = ChangeBus::new();
    let storage = Rc::new(MemoryStorage::new());
    let settings = StoredSettings::new(
        Some("ui"),
        SettingsDecl::new().with("layout", Kind::Map),
        storage.clone(),
        &bus,
    )
    .unwrap();
    let data = settings.provide_defaults();
    let _binding = settings.on_create(&data).unwrap();

    data.get("layout").unwrap().update(|v| {
        if let Value::Map(m) = v {
            m.insert("sidebar".into(), json!(240));
        }
    });
    assert_eq!(
        storage.get_item("ui.layout").as_deref(),
        Some(r#"{"sidebar":240}"#)
    );
}

#[test]
fn shallow_list_ignores_in_place_edits() {
    let storage = Rc::new(MemoryStorage::new());
    let settings = StoredSettings::new(
        None,
        SettingsDecl::new().with("items", Kind::List),
        storage.clone(),
        &ChangeBus::new(),
    )
    .unwrap();
    let data = settings.provide_defaults();
    let _binding = settings.on_create(&data).unwrap();
    let field = data.get("items").unwrap();

    field.update(|v| {
        if let Value::List(items) = v {
            items.push(json!(1));
        }
    });
    assert_eq!(storage.get_item("items"), None);

    field.splice_list(vec![json!(1), json!(2)]);
    assert_eq!(storage.get_item("items").as_deref(), Some("[1,2]"));
}

#[test]
fn readonly_false_disables_sync() {
    let bus = ChangeBus::new();
    let storage = Rc::new(MemoryStorage::new());
    let settings = StoredSettings::new(
        Some("ui"),
        SettingsDecl::new()
            .with("draft", SettingSpec::of(Kind::Text).readonly(false))
            .with("title", SettingSpec::of(Kind::Text).readonly(true)),
        storage.clone(),
        &bus,
    )
    .unwrap();
    let data = settings.provide_defaults();
    let binding = settings.on_create(&data).unwrap();

    assert_eq!(binding.synced_settings(), 1);
    assert_eq!(bus.subscriber_count("ui.draft"), 0);

    data.get("draft").unwrap().set(Value::from("wip"));
    data.get("title").unwrap().set(Value::from("Report"));
    assert_eq!(storage.get_item("ui.draft"), None);
    assert_eq!(storage.get_item("ui.title").as_deref(), Some("Report"));

    // Explicit writes still go through.
    settings.write("draft", &Value::from("saved")).unwrap();
    assert_eq!(storage.get_item("ui.draft").as_deref(), Some("saved"));
}

#[test]
fn null_field_value_is_not_stored() {
    let storage = Rc::new(MemoryStorage::new());
    let settings = StoredSettings::new(
        None,
        SettingsDecl::new().with("since", Kind::Timestamp),
        storage.clone(),
        &ChangeBus::new(),
    )
    .unwrap();
    storage.set_item("since", "2024-01-01T00:00:00.000Z").unwrap();
    let data = settings.provide_defaults();
    let _binding = settings.on_create(&data).unwrap();

    data.get("since").unwrap().set(Value::Null);
    assert_eq!(
        storage.get_item("since").as_deref(),
        Some("2024-01-01T00:00:00.000Z")
    );
}

#[test]
fn destroy_releases_everything() {
    let origin = MemoryOrigin::new();
    let other = origin.context();
    let storage = Rc::new(origin.context());
    let bus = ChangeBus::new();
    let settings = StoredSettings::new(Some("ui"), counter_decl(), storage.clone(), &bus).unwrap();
    let data = settings.provide_defaults();
    let mut binding = settings.on_create(&data).unwrap();

    assert!(binding.is_bound());
    assert!(binding.listens_remote());
    assert_eq!(bus.subscriber_count("ui.count"), 1);
    assert_eq!(origin.listener_count(), 1);
    assert_eq!(data.get("count").unwrap().watcher_count(), 1);

    settings.on_destroy(&mut binding);

    assert!(!binding.is_bound());
    assert_eq!(bus.total_subscribers(), 0);
    assert_eq!(origin.listener_count(), 0);
    assert_eq!(data.get("count").unwrap().watcher_count(), 0);

    data.get("count").unwrap().set(Value::Integer(4));
    assert_eq!(storage.get_item("ui.count"), None);
    bus.publish("ui.count", &Value::Integer(8));
    other.set_item("ui.count", "9").unwrap();
    origin.dispatch_pending();
    assert_eq!(data.get("count").unwrap().get(), Value::Integer(4));

    settings.on_destroy(&mut binding);
}

#[test]
fn dropping_binding_releases_subscriptions() {
    let bus = ChangeBus::new();
    let storage = Rc::new(MemoryStorage::new());
    let settings = StoredSettings::new(Some("ui"), counter_decl(), storage, &bus).unwrap();
    let data = settings.provide_defaults();
    {
        let _binding = settings.on_create(&data).unwrap();
        assert_eq!(bus.total_subscribers(), 1);
    }
    assert_eq!(bus.total_subscribers(), 0);
}

#[test]
fn custom_codec_round_trips_through_storage() {
    let bus = ChangeBus::new();
    let storage = Rc::new(MemoryStorage::new());
    let csv = Codec::new(
        |raw| {
            Value::List(
                raw.split(',')
                    .filter(|s| !s.is_empty())
                    .map(|s| json!(s))
                    .collect(),
            )
        },
        |value| {
            value
                .as_list()
                .unwrap_or_default()
                .iter()
                .filter_map(|v| v.as_str())
                .collect::<Vec<_>>()
                .join(",")
        },
    );
    let settings = StoredSettings::new(
        Some("ui"),
        SettingsDecl::new().with("cols", SettingSpec::new().codec(&csv)),
        storage.clone(),
        &bus,
    )
    .unwrap();

    settings
        .write("cols", &Value::List(vec![json!("name"), json!("size")]))
        .unwrap();
    assert_eq!(storage.get_item("ui.cols").as_deref(), Some("name,size"));
    assert_eq!(
        settings.read("cols").unwrap(),
        Value::List(vec![json!("name"), json!("size")])
    );
}

#[test]
fn missing_codec_fails_at_setup() {
    let result = StoredSettings::new(
        None,
        SettingsDecl::new().with("x", SettingSpec::new().default_value(1)),
        Rc::new(MemoryStorage::new()),
        &ChangeBus::new(),
    );
    assert!(result.is_err());
}

#[test]
fn list_form_declares_raw_settings() {
    let storage = Rc::new(MemoryStorage::new());
    storage.set_item("app.mode", "compact").unwrap();
    let settings = StoredSettings::new(
        Some("app"),
        SettingsDecl::names(["mode", "lang"]),
        storage.clone(),
        &ChangeBus::new(),
    )
    .unwrap();
    let data = settings.provide_defaults();
    assert_eq!(data.get("mode").unwrap().get(), Value::from("compact"));
    assert_eq!(data.get("lang").unwrap().get(), Value::Null);

    let _binding = settings.on_create(&data).unwrap();
    data.get("lang").unwrap().set(Value::from("fi"));
    assert_eq!(storage.get_item("app.lang").as_deref(), Some("fi"));
}

#[test]
fn watcher_side_effects_see_each_write_once() {
    let bus = ChangeBus::new();
    let storage = Rc::new(MemoryStorage::new());
    let settings = StoredSettings::new(Some("ui"), counter_decl(), storage, &bus).unwrap();
    let published = Rc::new(Cell::new(0));
    let p = Rc::clone(&published);
    let _tap = bus.subscribe("ui.count", move |_| p.set(p.get() + 1));

    let bindings: Vec<_> = (0..3)
        .map(|_| {
            let data = settings.provide_defaults();
            let binding = settings.on_create(&data).unwrap();
            (data, binding)
        })
        .collect();

    bindings[1].0.get("count").unwrap().set(Value::Integer(2));

    assert_eq!(published.get(), 1);
    for (data, _) in &bindings {
        assert_eq!(data.get("count").unwrap().get(), Value::Integer(2));
    }
}
