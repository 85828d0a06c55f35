//! End-to-end binding scenarios across the whole stack: expression text in,
//! live synchronized object graphs out.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tether::binding::{BindingBuilder, BindingError, BindingMode, BindingState};
use tether::core::{
    ChangeEvent, DynObject, EngineContext, ManualScheduler, ObservableList, Scheduler, Value,
    ViewModel,
};
use tether::expr::parse;
use tether::observe::PathError;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn context() -> Arc<EngineContext> {
    init_tracing();
    Arc::new(EngineContext::default())
}

fn member(vm: &Arc<ViewModel>, name: &str) -> Value {
    vm.get_member(name).unwrap_or(Value::Null)
}

/// Builds `root.A.B[0].C` where `B` is a list of child view-models.
fn deep_graph(leaf: i64) -> (Arc<ViewModel>, Arc<ViewModel>) {
    let root = ViewModel::new("Root");
    let a = ViewModel::new("A");
    let item = ViewModel::new("Item");
    item.seed("C", leaf);
    let b = ObservableList::from_values(vec![item.as_value()]);
    a.seed("B", b);
    root.seed("A", a.as_value());
    (root, item)
}

#[test]
fn deep_path_with_indexer_stays_live() {
    let (root, item) = deep_graph(1);
    let view = ViewModel::new("View");
    view.seed("Text", 0i64);

    let binding = BindingBuilder::new(context())
        .source_path(root.clone(), "A.B[0].C")
        .target_path(view.clone(), "Text")
        .build()
        .unwrap();

    assert_eq!(member(&view, "Text"), Value::Int(1));

    // Leaf change.
    item.set_member("C", Value::Int(2));
    assert_eq!(member(&view, "Text"), Value::Int(2));

    // List element replacement repoints the tail.
    let replacement = ViewModel::new("Item");
    replacement.seed("C", 30i64);
    let list = match member(&root, "A") {
        Value::Object(a) => match a.get_member("B") {
            Some(Value::List(list)) => list,
            other => panic!("expected list, got {other:?}"),
        },
        other => panic!("expected object, got {other:?}"),
    };
    assert!(list.set(0, replacement.as_value()));
    assert_eq!(member(&view, "Text"), Value::Int(30));

    // The old element is no longer observed.
    item.set_member("C", Value::Int(99));
    assert_eq!(member(&view, "Text"), Value::Int(30));

    assert_eq!(binding.state(), BindingState::Valid);
}

#[test]
fn intermediate_replacement_rebuilds_the_chain() {
    let (root, _item) = deep_graph(1);
    let view = ViewModel::new("View");
    view.seed("Text", 0i64);

    let _binding = BindingBuilder::new(context())
        .source_path(root.clone(), "A.B[0].C")
        .target_path(view.clone(), "Text")
        .build()
        .unwrap();

    // Swap the whole A subtree.
    let a2 = ViewModel::new("A");
    let item2 = ViewModel::new("Item");
    item2.seed("C", 7i64);
    a2.seed("B", ObservableList::from_values(vec![item2.as_value()]));
    root.set_member("A", a2.as_value());
    assert_eq!(member(&view, "Text"), Value::Int(7));

    // The new subtree is live.
    item2.set_member("C", Value::Int(8));
    assert_eq!(member(&view, "Text"), Value::Int(8));
}

#[test]
fn one_way_writes_exactly_once_per_change() {
    let source = ViewModel::new("Model");
    source.seed("Name", "a");
    let target = ViewModel::new("View");
    target.seed("Text", "");

    let writes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&writes);
    let _sub = target.observe(Arc::new(move |event: &ChangeEvent| {
        if matches!(event, ChangeEvent::Member { name } if &**name == "Text") {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }));

    let _binding = BindingBuilder::new(context())
        .source_path(source.clone(), "Name")
        .target_path(target.clone(), "Text")
        .build()
        .unwrap();
    assert_eq!(writes.load(Ordering::SeqCst), 1);

    source.set_member("Name", Value::from("b"));
    assert_eq!(writes.load(Ordering::SeqCst), 2);

    // Writing an equal value notifies nothing, so nothing flows.
    source.set_member("Name", Value::from("b"));
    assert_eq!(writes.load(Ordering::SeqCst), 2);
}

#[test]
fn two_way_delayed_edits_coalesce_to_the_last_value() {
    init_tracing();
    let scheduler = Arc::new(ManualScheduler::new());
    let context = Arc::new(
        EngineContext::default().with_scheduler(Arc::clone(&scheduler) as Arc<dyn Scheduler>),
    );
    let source = ViewModel::new("Model");
    source.seed("A", 0i64);
    let target = ViewModel::new("View");
    target.seed("B", 0i64);

    let _binding = BindingBuilder::new(context)
        .mode(BindingMode::TwoWay)
        .source_path(source.clone(), "A")
        .target_path(target.clone(), "B")
        .delay(Duration::from_millis(10))
        .build()
        .unwrap();

    // Flush the debounced initial flow.
    scheduler.run_pending();

    // Three rapid edits on the target side become one source write.
    target.set_member("B", Value::Int(1));
    target.set_member("B", Value::Int(2));
    target.set_member("B", Value::Int(3));
    assert_eq!(member(&source, "A"), Value::Int(0));
    assert_eq!(scheduler.pending(), 1);

    scheduler.run_pending();
    assert_eq!(member(&source, "A"), Value::Int(3));

    // The echo of that write is suppressed, not re-debounced.
    assert_eq!(scheduler.pending(), 0);
}

#[test]
fn optional_chain_recovers_when_the_head_appears() {
    let root = ViewModel::new("Root");
    root.seed("A", Value::Null);
    let view = ViewModel::new("View");
    view.seed("Text", 0i64);

    let binding = BindingBuilder::new(context())
        .source_path(root.clone(), "A?.B.C")
        .target_path(view.clone(), "Text")
        .build()
        .unwrap();

    assert_eq!(member(&view, "Text"), Value::Null);
    assert_eq!(binding.state(), BindingState::Valid);

    let b = ViewModel::new("B");
    b.seed("C", 5i64);
    let a = ViewModel::new("A");
    a.seed("B", b.as_value());
    root.set_member("A", a.as_value());

    assert_eq!(member(&view, "Text"), Value::Int(5));
    b.set_member("C", Value::Int(6));
    assert_eq!(member(&view, "Text"), Value::Int(6));
}

#[test]
fn expression_over_several_chains() {
    let model = ViewModel::new("Model");
    model.seed("First", "ada");
    model.seed("Last", "lovelace");
    let view = ViewModel::new("View");
    view.seed("Full", "");

    let _binding = BindingBuilder::new(context())
        .source_expression(model.clone(), "First + \" \" + Last")
        .target_path(view.clone(), "Full")
        .build()
        .unwrap();

    assert_eq!(member(&view, "Full"), Value::from("ada lovelace"));
    model.set_member("Last", Value::from("byron"));
    assert_eq!(member(&view, "Full"), Value::from("ada byron"));
}

#[test]
fn conditional_expression_switches_branches() {
    let model = ViewModel::new("Model");
    model.seed("Count", 0i64);
    model.seed("Name", "inbox");
    let view = ViewModel::new("View");
    view.seed("Label", "");

    let _binding = BindingBuilder::new(context())
        .source_expression(model.clone(), "Count > 0 ? Name : \"empty\"")
        .target_path(view.clone(), "Label")
        .build()
        .unwrap();

    assert_eq!(member(&view, "Label"), Value::from("empty"));
    model.set_member("Count", Value::Int(3));
    assert_eq!(member(&view, "Label"), Value::from("inbox"));
    model.set_member("Name", Value::from("archive"));
    assert_eq!(member(&view, "Label"), Value::from("archive"));
}

#[test]
fn malformed_inputs_fail_synchronously() {
    let model = ViewModel::new("Model");
    model.seed("A", 1i64);
    let view = ViewModel::new("View");
    view.seed("Text", 0i64);

    // Double dot in a member path.
    let err = BindingBuilder::new(context())
        .source_path(model.clone(), "A..B")
        .target_path(view.clone(), "Text")
        .build()
        .unwrap_err();
    assert!(matches!(
        err,
        BindingError::Path(PathError::ExpectedName { position: 2 })
    ));

    // Double dot in an expression.
    let err = parse("A..B").unwrap_err();
    assert_eq!(err.position, 2);

    // Unreadable source member.
    let err = BindingBuilder::new(context())
        .source_path(model.clone(), "Missing.Tail")
        .target_path(view.clone(), "Text")
        .build()
        .unwrap_err();
    assert!(matches!(err, BindingError::Observation(_)));
    assert_eq!(view.listener_count(), 0);
}

#[test]
fn disposed_binding_is_fully_inert() {
    let (root, item) = deep_graph(1);
    let view = ViewModel::new("View");
    view.seed("Text", 0i64);

    let binding = BindingBuilder::new(context())
        .source_path(root.clone(), "A.B[0].C")
        .target_path(view.clone(), "Text")
        .build()
        .unwrap();
    assert!(root.listener_count() > 0);

    binding.dispose();
    assert_eq!(binding.state(), BindingState::Disposed);
    assert_eq!(root.listener_count(), 0);
    assert_eq!(item.listener_count(), 0);
    assert_eq!(view.listener_count(), 0);

    item.set_member("C", Value::Int(50));
    assert_eq!(member(&view, "Text"), Value::Int(1));
}

#[test]
fn errors_render_with_context() {
    let errors: Arc<Mutex<Vec<String>>> = Arc::default();
    let sink = Arc::clone(&errors);

    let model = ViewModel::new("Model");
    model.seed("A", 2i64);
    model.seed("B", 0i64);
    let view = ViewModel::new("View");
    view.seed("Q", 0i64);

    let binding = BindingBuilder::new(context())
        .source_expression(model.clone(), "A / B")
        .target_path(view.clone(), "Q")
        .on_error(Arc::new(move |error| {
            sink.lock().unwrap().push(error.to_string());
        }))
        .build()
        .unwrap();

    // The initial flow already divided by zero.
    assert_eq!(binding.state(), BindingState::Invalid);
    assert_eq!(errors.lock().unwrap().len(), 1);

    model.set_member("B", Value::Int(2));
    assert_eq!(member(&view, "Q"), Value::Int(1));
    assert_eq!(binding.state(), BindingState::Valid);
}
