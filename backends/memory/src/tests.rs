//! End-to-end tests of the reconciler against the memory host.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use eddy_core::{
    Component, Destroy, Hooks, Lanes, Node, Priority, PropValue, Props, ReconcilerConfig,
    SetState, component, deps, fragment, h,
};

use crate::{HostOp, ManualScheduler, NodeId, SyntheticEvent, TestRoot};

// ============================================================================
// Test Infrastructure
// ============================================================================

type Log = Rc<RefCell<Vec<String>>>;

fn new_log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

fn drain(log: &Log) -> Vec<String> {
    core::mem::take(&mut *log.borrow_mut())
}

fn push(log: &Log, entry: impl Into<String>) {
    log.borrow_mut().push(entry.into());
}

fn cleanup(log: &Log, entry: String) -> Option<Destroy> {
    let log = log.clone();
    Some(Box::new(move || log.borrow_mut().push(entry)))
}

/// Keeps the latest setter of a component so a test can dispatch from outside.
struct Captured<S>(Rc<RefCell<Option<SetState<S>>>>);

impl<S> Clone for Captured<S> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<S: Clone + 'static> Captured<S> {
    fn new() -> Self {
        Self(Rc::new(RefCell::new(None)))
    }

    fn store(&self, setter: &SetState<S>) {
        *self.0.borrow_mut() = Some(setter.clone());
    }

    fn get(&self) -> SetState<S> {
        self.0.borrow().clone().expect("component rendered at least once")
    }
}

fn keyed_list(keys: &[&str]) -> Node {
    h("ul")
        .attr("id", "list")
        .children(keys.iter().map(|key| h("li").key(*key).attr("id", *key).child(*key)))
        .into()
}

fn list_node(root: &TestRoot) -> NodeId {
    root.find("id", "list").expect("list is mounted")
}

fn creations(ops: &[HostOp]) -> usize {
    ops.iter()
        .filter(|op| matches!(op, HostOp::CreateElement { .. } | HostOp::CreateText { .. }))
        .count()
}

fn label(root: &TestRoot) -> String {
    root.find("id", "label")
        .map(|node| root.host().text_of(node))
        .unwrap_or_default()
}

fn append_char(c: char) -> impl Fn(&String) -> String {
    move |prev| format!("{prev}{c}")
}

// ============================================================================
// Mounting and reuse
// ============================================================================

#[test]
fn mount_builds_detached_tree_then_attaches_once() -> anyhow::Result<()> {
    let root = TestRoot::new()?;
    root.render(keyed_list(&["a", "b"]))?;

    assert_eq!(
        root.html(),
        "<ul id=\"list\"><li id=\"a\">a</li><li id=\"b\">b</li></ul>"
    );
    let ops = root.host().take_ops();
    let attached: Vec<_> = ops
        .iter()
        .filter(|op| matches!(op, HostOp::Append { .. } | HostOp::Insert { .. }))
        .collect();
    assert_eq!(
        attached,
        vec![&HostOp::Append {
            parent: root.container(),
            child: list_node(&root),
        }]
    );
    assert_eq!(creations(&ops), 5);
    Ok(())
}

#[test]
fn identical_rerender_touches_no_host_node() -> anyhow::Result<()> {
    let root = TestRoot::new()?;
    root.render(keyed_list(&["a", "b", "c"]))?;
    let before = root.host().children(list_node(&root));
    root.host().take_ops();

    root.render(keyed_list(&["a", "b", "c"]))?;

    assert!(root.host().take_ops().is_empty());
    assert_eq!(root.host().children(list_node(&root)), before);
    assert!(root.errors().is_empty());
    Ok(())
}

#[test]
fn text_changes_are_applied_in_place() -> anyhow::Result<()> {
    let root = TestRoot::new()?;
    root.render(h("p").child(1))?;
    let text = root.host().children(root.host().children(root.container())[0])[0];
    root.host().take_ops();

    root.render(h("p").child(2))?;

    assert_eq!(
        root.host().take_ops(),
        vec![HostOp::SetText {
            id: text,
            text: "2".to_owned(),
        }]
    );
    assert_eq!(root.html(), "<p>2</p>");
    Ok(())
}

#[test]
fn attribute_changes_are_applied_in_place() -> anyhow::Result<()> {
    let root = TestRoot::new()?;
    root.render(h("div").attr("class", "a").attr("title", "t"))?;
    let div = root.host().children(root.container())[0];
    root.host().take_ops();

    root.render(h("div").attr("class", "b"))?;

    assert_eq!(
        root.host().take_ops(),
        vec![HostOp::SetProps {
            id: div,
            changed: vec!["class".to_owned(), "title".to_owned()],
        }]
    );
    assert_eq!(root.html(), "<div class=\"b\"></div>");
    Ok(())
}

#[test]
fn top_level_fragment_renders_its_children() -> anyhow::Result<()> {
    let pair = Component::named("Pair", |_: &mut Hooks<'_>, _: &Props| {
        Ok(fragment().child(h("p").child("one")).child(h("p").child("two")).into())
    });
    let root = TestRoot::new()?;
    root.render(component(&pair))?;
    assert_eq!(root.html(), "<p>one</p><p>two</p>");

    root.host().take_ops();
    root.render(component(&pair))?;
    assert!(root.host().take_ops().is_empty());
    Ok(())
}

#[test]
fn ops_serialize_with_snake_case_tags() -> anyhow::Result<()> {
    let root = TestRoot::new()?;
    root.render(h("p").child("a"))?;
    root.host().take_ops();
    root.render(h("p").child("b"))?;

    let ops = serde_json::to_value(root.host().take_ops())?;
    assert_eq!(ops[0]["op"], "set_text");
    assert_eq!(ops[0]["text"], "b");
    assert_eq!(
        root.host().snapshot(root.container()),
        serde_json::json!({
            "container": "root",
            "children": [{ "tag": "p", "attrs": {}, "children": ["b"] }],
        })
    );
    Ok(())
}

// ============================================================================
// Keyed lists
// ============================================================================

#[test]
fn moving_last_item_to_front_inserts_one_node() -> anyhow::Result<()> {
    let root = TestRoot::new()?;
    root.render(keyed_list(&["a", "b", "c"]))?;
    let list = list_node(&root);
    let [a, b, c] = <[NodeId; 3]>::try_from(root.host().children(list)).expect("three items");
    root.host().take_ops();

    root.render(keyed_list(&["c", "a", "b"]))?;

    assert_eq!(
        root.host().take_ops(),
        vec![HostOp::Insert {
            parent: list,
            child: c,
            before: a,
        }]
    );
    assert_eq!(root.host().children(list), vec![c, a, b]);
    Ok(())
}

#[test]
fn moving_first_item_to_back_appends_one_node() -> anyhow::Result<()> {
    let root = TestRoot::new()?;
    root.render(keyed_list(&["a", "b", "c"]))?;
    let list = list_node(&root);
    let [a, b, c] = <[NodeId; 3]>::try_from(root.host().children(list)).expect("three items");
    root.host().take_ops();

    root.render(keyed_list(&["b", "c", "a"]))?;

    assert_eq!(
        root.host().take_ops(),
        vec![HostOp::Append {
            parent: list,
            child: a,
        }]
    );
    assert_eq!(root.host().children(list), vec![b, c, a]);
    Ok(())
}

#[test]
fn removed_keys_are_deleted_and_new_keys_created() -> anyhow::Result<()> {
    let root = TestRoot::new()?;
    root.render(keyed_list(&["a", "b", "c"]))?;
    let list = list_node(&root);
    let [a, b, c] = <[NodeId; 3]>::try_from(root.host().children(list)).expect("three items");
    root.host().take_ops();

    root.render(keyed_list(&["a", "c", "d"]))?;

    let ops = root.host().take_ops();
    assert!(ops.contains(&HostOp::Remove {
        parent: list,
        child: b,
    }));
    assert_eq!(creations(&ops), 2);
    let children = root.host().children(list);
    assert_eq!(children.len(), 3);
    assert_eq!(&children[..2], &[a, c]);
    assert_eq!(root.html(), "<ul id=\"list\"><li id=\"a\">a</li><li id=\"c\">c</li><li id=\"d\">d</li></ul>");
    Ok(())
}

#[test]
fn duplicate_keys_leave_no_stale_nodes() -> anyhow::Result<()> {
    let root = TestRoot::new()?;
    root.render(
        h("ul")
            .child(h("li").key("a").child("1"))
            .child(h("li").key("a").child("2")),
    )?;
    assert_eq!(root.text(), "12");

    root.render(h("ul").child(h("li").key("b").child("3")))?;

    assert_eq!(root.html(), "<ul><li>3</li></ul>");
    assert!(root.errors().is_empty());
    Ok(())
}

#[test]
fn type_change_under_same_key_replaces_the_node() -> anyhow::Result<()> {
    let root = TestRoot::new()?;
    root.render(h("div").children([h("span").key("x").child("old")]))?;
    let div = root.host().children(root.container())[0];
    let span = root.host().children(div)[0];
    root.host().take_ops();

    root.render(h("div").children([h("b").key("x").child("new")]))?;

    let ops = root.host().take_ops();
    assert!(ops.contains(&HostOp::Remove {
        parent: div,
        child: span,
    }));
    assert_eq!(root.html(), "<div><b>new</b></div>");
    Ok(())
}

// ============================================================================
// State and batching
// ============================================================================

fn counter(renders: &Rc<Cell<usize>>) -> Component {
    let renders = renders.clone();
    Component::named("Counter", move |hooks: &mut Hooks<'_>, _: &Props| {
        renders.set(renders.get() + 1);
        let (count, set_count) = hooks.use_state(2)?;
        Ok(h("button")
            .attr("id", "inc")
            .on("click", move |_| {
                for _ in 0..3 {
                    set_count.update(|n| n + 1);
                }
            })
            .child(count)
            .into())
    })
}

#[test]
fn updates_from_one_handler_commit_together() -> anyhow::Result<()> {
    let renders = Rc::new(Cell::new(0));
    let root = TestRoot::new()?;
    root.render(component(&counter(&renders)))?;
    assert_eq!(renders.get(), 1);
    assert_eq!(root.text(), "2");

    assert_eq!(root.click_by_attr("id", "inc"), Some(1));

    assert_eq!(renders.get(), 2);
    assert_eq!(root.text(), "5");
    Ok(())
}

#[test]
fn state_survives_parent_rerenders() -> anyhow::Result<()> {
    let renders = Rc::new(Cell::new(0));
    let counter = counter(&renders);
    let root = TestRoot::new()?;
    root.render(h("main").child(component(&counter)))?;
    root.click_by_attr("id", "inc");
    assert_eq!(root.text(), "5");

    root.render(h("main").attr("class", "wide").child(component(&counter)))?;

    assert_eq!(root.text(), "5");
    assert_eq!(renders.get(), 3);
    Ok(())
}

#[test]
fn bubbling_handlers_share_one_commit() -> anyhow::Result<()> {
    let renders = Rc::new(Cell::new(0));
    let seen = new_log();
    let app = {
        let renders = renders.clone();
        let seen = seen.clone();
        Component::named("Panel", move |hooks: &mut Hooks<'_>, _: &Props| {
            renders.set(renders.get() + 1);
            let (outer, set_outer) = hooks.use_state(0)?;
            let (inner, set_inner) = hooks.use_state(0)?;
            let seen = seen.clone();
            Ok(h("div")
                .on("click", move |_| set_outer.update(|n| n + 1))
                .child(
                    h("button")
                        .attr("id", "target")
                        .on("click", move |event| {
                            if let Some(event) = event.downcast_ref::<SyntheticEvent>() {
                                push(&seen, event.kind());
                            }
                            set_inner.update(|n| n + 10);
                        })
                        .child(outer + inner),
                )
                .into())
        })
    };
    let root = TestRoot::new()?;
    root.render(component(&app))?;

    assert_eq!(root.click_by_attr("id", "target"), Some(2));

    assert_eq!(renders.get(), 2);
    assert_eq!(root.text(), "11");
    assert_eq!(drain(&seen), vec!["click"]);
    Ok(())
}

#[test]
fn lower_lane_updates_are_skipped_then_rebased() -> anyhow::Result<()> {
    let setter = Captured::<String>::new();
    let app = {
        let setter = setter.clone();
        Component::named("Letters", move |hooks: &mut Hooks<'_>, _: &Props| {
            let (letters, set_letters) = hooks.use_state(String::new())?;
            setter.store(&set_letters);
            Ok(h("p").attr("id", "label").child(letters).into())
        })
    };
    let root = TestRoot::new()?;
    root.render(component(&app))?;

    setter.get().update(append_char('a'));
    assert!(root.reconciler().pending_lanes(root.root()).contains(Lanes::DEFAULT));
    root.reconciler()
        .discrete_updates(|| setter.get().update(append_char('b')));
    root.flush_microtasks();

    assert_eq!(label(&root), "b");
    assert!(root.reconciler().pending_lanes(root.root()).contains(Lanes::DEFAULT));

    root.flush();
    assert_eq!(label(&root), "ab");
    assert_eq!(root.reconciler().pending_lanes(root.root()), Lanes::NONE);
    Ok(())
}

#[test]
fn update_lane_selects_scheduler_priority() -> anyhow::Result<()> {
    let setter = Captured::<i32>::new();
    let app = {
        let setter = setter.clone();
        Component::named("Deferred", move |hooks: &mut Hooks<'_>, _: &Props| {
            let (value, set_value) = hooks.use_state(0)?;
            setter.store(&set_value);
            Ok(h("p").attr("id", "label").child(value).into())
        })
    };
    let root = TestRoot::new()?;
    root.render(component(&app))?;

    root.reconciler()
        .with_update_lane(Lanes::TRANSITION, || setter.get().set(7));

    assert_eq!(root.scheduler().next_priority(), Some(Priority::Low));
    assert_eq!(label(&root), "0");
    root.flush();
    assert_eq!(label(&root), "7");
    Ok(())
}

#[test]
fn urgent_update_interrupts_a_yielded_render() -> anyhow::Result<()> {
    let setter = Captured::<String>::new();
    let app = {
        let setter = setter.clone();
        Component::named("Slow", move |hooks: &mut Hooks<'_>, _: &Props| {
            let (letters, set_letters) = hooks.use_state(String::new())?;
            setter.store(&set_letters);
            Ok(h("div")
                .child(h("p").attr("id", "label").child(letters.clone()))
                .child(h("ul").children((0..20).map(|i| h("li").key(i.to_string()).child(i))))
                .into())
        })
    };
    let root = TestRoot::with_scheduler(ManualScheduler::with_budget(3), ReconcilerConfig::default())?;
    root.render(component(&app))?;
    let live = root.reconciler().live_fibers();

    setter.get().update(append_char('a'));
    assert!(root.scheduler().run_next());
    assert_eq!(root.scheduler().pending(), 1, "render yielded and stays queued");
    assert_eq!(label(&root), "");

    root.reconciler()
        .discrete_updates(|| setter.get().update(append_char('b')));
    assert_eq!(root.scheduler().pending(), 0, "superseded render is cancelled");
    root.flush_microtasks();
    assert_eq!(label(&root), "b");

    root.flush();
    assert_eq!(label(&root), "ab");
    assert!(root.errors().is_empty());
    assert!(root.reconciler().live_fibers() <= live * 2);
    Ok(())
}

#[test]
fn disabled_time_slicing_renders_in_one_slice() -> anyhow::Result<()> {
    let setter = Captured::<String>::new();
    let app = {
        let setter = setter.clone();
        Component::named("Eager", move |hooks: &mut Hooks<'_>, _: &Props| {
            let (letters, set_letters) = hooks.use_state(String::new())?;
            setter.store(&set_letters);
            Ok(h("div")
                .child(h("p").attr("id", "label").child(letters.clone()))
                .child(h("ul").children((0..20).map(|i| h("li").key(i.to_string()).child(i))))
                .into())
        })
    };
    let root = TestRoot::with_scheduler(
        ManualScheduler::with_budget(1),
        ReconcilerConfig::new().time_slicing(false),
    )?;
    root.render(component(&app))?;

    setter.get().update(append_char('a'));
    assert!(root.scheduler().run_next());
    assert_eq!(label(&root), "a");
    assert_eq!(root.scheduler().pending(), 0);
    Ok(())
}

#[test]
fn timed_out_task_finishes_without_yielding() -> anyhow::Result<()> {
    let setter = Captured::<String>::new();
    let app = {
        let setter = setter.clone();
        Component::named("Late", move |hooks: &mut Hooks<'_>, _: &Props| {
            let (letters, set_letters) = hooks.use_state(String::new())?;
            setter.store(&set_letters);
            Ok(h("div")
                .child(h("p").attr("id", "label").child(letters.clone()))
                .child(h("ul").children((0..20).map(|i| h("li").key(i.to_string()).child(i))))
                .into())
        })
    };
    let root = TestRoot::with_scheduler(ManualScheduler::with_budget(1), ReconcilerConfig::default())?;
    root.render(component(&app))?;

    setter.get().update(append_char('a'));
    assert!(root.scheduler().run_next());
    assert_eq!(label(&root), "", "slice budget makes the render yield");
    assert_eq!(root.scheduler().pending(), 1);

    root.scheduler().set_timed_out(true);
    assert!(root.scheduler().run_next());
    assert_eq!(label(&root), "a");
    assert_eq!(root.scheduler().pending(), 0);
    Ok(())
}

#[test]
fn updates_after_unmount_are_dropped() -> anyhow::Result<()> {
    let setter = Captured::<i32>::new();
    let app = {
        let setter = setter.clone();
        Component::named("Gone", move |hooks: &mut Hooks<'_>, _: &Props| {
            let (value, set_value) = hooks.use_state(0)?;
            setter.store(&set_value);
            Ok(h("p").child(value).into())
        })
    };
    let root = TestRoot::new()?;
    root.render(component(&app))?;
    root.unmount()?;

    setter.get().set(3);
    root.flush();

    assert_eq!(root.html(), "");
    assert!(root.errors().is_empty());
    assert_eq!(root.reconciler().pending_lanes(root.root()), Lanes::NONE);
    Ok(())
}

// ============================================================================
// Effects
// ============================================================================

fn effect_probe(root: &TestRoot, log: &Log) -> Component {
    let host = root.host().clone();
    let container = root.container();
    let log = log.clone();
    Component::named("Probe", move |hooks: &mut Hooks<'_>, props: &Props| {
        let value = props.get_str("value").unwrap_or_default().to_owned();
        {
            let (log, host, value) = (log.clone(), host.clone(), value.clone());
            hooks.use_layout_effect(deps![value.clone()], move || {
                push(&log, format!("layout {value} sees {}", host.text_of(container)));
                cleanup(&log, format!("layout cleanup {value}"))
            })?;
        }
        {
            let (log, value) = (log.clone(), value.clone());
            hooks.use_effect(deps![value.clone()], move || {
                push(&log, format!("passive {value}"));
                cleanup(&log, format!("passive cleanup {value}"))
            })?;
        }
        Ok(h("p").child(value).into())
    })
}

#[test]
fn effects_run_after_mutation_in_order() -> anyhow::Result<()> {
    let log = new_log();
    let root = TestRoot::new()?;
    let probe = effect_probe(&root, &log);

    root.schedule(component(&probe).attr("value", "a"))?;
    root.flush_microtasks();
    assert_eq!(drain(&log), vec!["layout a sees a"]);
    root.flush();
    assert_eq!(drain(&log), vec!["passive a"]);

    root.render(component(&probe).attr("value", "b"))?;
    assert_eq!(
        drain(&log),
        vec![
            "layout cleanup a",
            "layout b sees b",
            "passive cleanup a",
            "passive b",
        ]
    );

    root.render(component(&probe).attr("value", "b"))?;
    assert!(drain(&log).is_empty(), "unchanged deps skip both effects");

    root.unmount()?;
    assert_eq!(drain(&log), vec!["layout cleanup b", "passive cleanup b"]);
    Ok(())
}

#[test]
fn passive_effects_can_be_flushed_on_demand() -> anyhow::Result<()> {
    let log = new_log();
    let root = TestRoot::new()?;
    let probe = effect_probe(&root, &log);

    root.schedule(component(&probe).attr("value", "a"))?;
    root.flush_microtasks();
    assert_eq!(drain(&log), vec!["layout a sees a"]);
    assert_eq!(root.scheduler().pending(), 1, "passive flush is scheduled");

    assert!(root.reconciler().flush_passive_effects());
    assert_eq!(drain(&log), vec!["passive a"]);
    assert_eq!(root.scheduler().pending(), 0, "scheduled flush is cancelled");
    assert!(!root.reconciler().flush_passive_effects());
    Ok(())
}

#[test]
fn dependency_lists_control_reruns() -> anyhow::Result<()> {
    let every = Rc::new(Cell::new(0));
    let once = Rc::new(Cell::new(0));
    let app = {
        let (every, once) = (every.clone(), once.clone());
        Component::named("Counts", move |hooks: &mut Hooks<'_>, _: &Props| {
            let every = every.clone();
            hooks.use_effect(None, move || {
                every.set(every.get() + 1);
                None
            })?;
            let once = once.clone();
            hooks.use_effect(deps![], move || {
                once.set(once.get() + 1);
                None
            })?;
            Ok(Node::Empty)
        })
    };
    let root = TestRoot::new()?;
    for _ in 0..3 {
        root.render(component(&app))?;
    }

    assert_eq!(every.get(), 3);
    assert_eq!(once.get(), 1);
    Ok(())
}

#[test]
fn passive_effect_updates_render_again() -> anyhow::Result<()> {
    let app = Component::named("Loader", |hooks: &mut Hooks<'_>, _: &Props| {
        let (value, set_value) = hooks.use_state(0)?;
        hooks.use_effect(deps![], move || {
            set_value.set(10);
            None
        })?;
        Ok(h("p").child(value).into())
    });
    let root = TestRoot::new()?;
    root.schedule(component(&app))?;
    root.flush_microtasks();
    assert_eq!(root.text(), "0");

    root.flush();
    assert_eq!(root.text(), "10");
    Ok(())
}

#[test]
fn deleting_a_subtree_detaches_once_and_cleans_every_component() -> anyhow::Result<()> {
    let log = new_log();
    let inner = {
        let log = log.clone();
        Component::named("Inner", move |hooks: &mut Hooks<'_>, props: &Props| {
            let name = props.get_str("name").unwrap_or_default().to_owned();
            let log = log.clone();
            let label = name.clone();
            hooks.use_effect(deps![], move || cleanup(&log, format!("cleanup {label}")))?;
            Ok(h("span").child(name).into())
        })
    };
    let outer = {
        let log = log.clone();
        Component::named("Outer", move |hooks: &mut Hooks<'_>, _: &Props| {
            let log = log.clone();
            hooks.use_layout_effect(deps![], move || cleanup(&log, "cleanup outer".to_owned()))?;
            Ok(h("div")
                .children(["1", "2"].map(|name| component(&inner).key(name).attr("name", name)))
                .into())
        })
    };
    let root = TestRoot::new()?;
    root.render(component(&outer))?;
    assert_eq!(root.html(), "<div><span>1</span><span>2</span></div>");
    let div = root.host().children(root.container())[0];
    root.host().take_ops();

    root.render(h("section"))?;

    let ops = root.host().take_ops();
    let removals: Vec<_> = ops
        .iter()
        .filter(|op| matches!(op, HostOp::Remove { .. }))
        .collect();
    assert_eq!(
        removals,
        vec![&HostOp::Remove {
            parent: root.container(),
            child: div,
        }]
    );
    let mut cleanups = drain(&log);
    cleanups.sort();
    assert_eq!(cleanups, vec!["cleanup 1", "cleanup 2", "cleanup outer"]);
    assert_eq!(root.html(), "<section></section>");
    Ok(())
}

#[test]
fn layout_effect_loop_hits_the_nested_update_limit() -> anyhow::Result<()> {
    let app = Component::named("Runaway", |hooks: &mut Hooks<'_>, _: &Props| {
        let (value, set_value) = hooks.use_state(0)?;
        hooks.use_layout_effect(None, move || {
            set_value.update(|n| n + 1);
            None
        })?;
        Ok(h("p").child(value).into())
    });
    let root = TestRoot::with_config(ReconcilerConfig::new().nested_update_limit(5))?;

    root.render(component(&app))?;

    let errors = root.take_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors[0].message,
        "maximum update depth exceeded after 5 synchronous renders"
    );
    assert_eq!(root.text(), "4");
    Ok(())
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn changed_hook_order_aborts_the_render() -> anyhow::Result<()> {
    let app = Component::named("Conditional", |hooks: &mut Hooks<'_>, props: &Props| {
        let (value, _) = hooks.use_state(1)?;
        if props.get("extra") == Some(&PropValue::Bool(true)) {
            hooks.use_state(2)?;
        }
        Ok(h("p").child(value).into())
    });
    let root = TestRoot::new()?;
    root.render(component(&app).attr("extra", true))?;
    root.host().take_ops();

    root.render(component(&app).attr("extra", false))?;

    let errors = root.take_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].component, Some("Conditional"));
    assert_eq!(errors[0].message, "hooks of `Conditional` changed between renders");
    assert_eq!(
        errors[0].source.as_deref(),
        Some("rendered fewer hooks than expected: 1 of 2")
    );
    assert!(root.host().take_ops().is_empty());
    assert_eq!(root.html(), "<p>1</p>");

    root.render(component(&app).attr("extra", true))?;
    assert!(root.errors().is_empty());
    assert_eq!(root.html(), "<p>1</p>");
    Ok(())
}

#[test]
fn component_errors_leave_the_committed_tree() -> anyhow::Result<()> {
    let app = Component::named("Fragile", |_: &mut Hooks<'_>, props: &Props| {
        if props.get("fail") == Some(&PropValue::Bool(true)) {
            anyhow::bail!("boom");
        }
        Ok(h("p").child("fine").into())
    });
    let root = TestRoot::new()?;
    root.render(component(&app))?;

    root.render(h("main").child(component(&app).attr("fail", true)))?;

    let errors = root.take_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "component `Fragile` failed to render");
    assert_eq!(errors[0].source.as_deref(), Some("boom"));
    assert_eq!(root.html(), "<p>fine</p>");
    Ok(())
}

#[test]
fn host_failures_abort_the_render() -> anyhow::Result<()> {
    let root = TestRoot::new()?;
    root.render(h("p").child("ok"))?;
    root.host().reject_tag("blink");

    root.render(h("blink").child("no"))?;

    let errors = root.take_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "host operation `create_instance` failed");
    assert_eq!(
        errors[0].source.as_deref(),
        Some("elements of type `blink` are rejected")
    );
    assert_eq!(root.html(), "<p>ok</p>");
    Ok(())
}

// ============================================================================
// Memory
// ============================================================================

#[test]
fn deleted_and_unmounted_fibers_are_released() -> anyhow::Result<()> {
    let keys: Vec<String> = (0..50).map(|i| i.to_string()).collect();
    let all: Vec<&str> = keys.iter().map(String::as_str).collect();
    let root = TestRoot::new()?;

    root.render(keyed_list(&all))?;
    root.render(keyed_list(&all))?;
    let full = root.reconciler().live_fibers();

    root.render(keyed_list(&all[..1]))?;
    assert!(root.reconciler().live_fibers() < full / 4);

    root.unmount()?;
    assert_eq!(root.html(), "");
    assert_eq!(root.reconciler().live_fibers(), 2);
    Ok(())
}
