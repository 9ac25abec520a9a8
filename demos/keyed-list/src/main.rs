//! Renders a keyed list into the memory host, reorders it and prints the host
//! operations each step needed.

use eddy::logging;
use eddy::memory::{HostOp, ManualScheduler, MemoryHost, SyntheticEvent};
use eddy::prelude::*;

fn todo_list(hooks: &mut Hooks<'_>, props: &Props) -> anyhow::Result<Node> {
    let (done, set_done) = hooks.use_state(0_i64)?;
    let items = props.get_str("items").unwrap_or_default().to_owned();

    let summary = items.clone();
    hooks.use_effect(deps![items.clone()], move || {
        tracing::info!(items = %summary, "list committed");
        None
    })?;

    Ok(h("section")
        .child(h("h1").child(format!("{done} done")))
        .child(
            h("ul").children(items.split(',').filter(|item| !item.is_empty()).map(|item| {
                let set_done = set_done.clone();
                h("li")
                    .key(item)
                    .attr("id", item)
                    .on("click", move |event| {
                        if let Some(event) = event.downcast_ref::<SyntheticEvent>() {
                            tracing::info!(target = %event.target(), "clicked");
                        }
                        set_done.update(|n| n + 1);
                    })
                    .child(item.to_owned())
            })),
        )
        .into())
}

fn print_ops(step: &str, host: &MemoryHost) -> anyhow::Result<()> {
    let ops: Vec<HostOp> = host.take_ops();
    println!("{step}: {} host operations", ops.len());
    for op in &ops {
        println!("  {}", serde_json::to_string(op)?);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    logging::install_tracing_with("keyed_list=info,eddy_core=warn");
    logging::install_panic_hook();

    let host = MemoryHost::new();
    let scheduler = ManualScheduler::new();
    let reconciler = Reconciler::new(host.clone(), scheduler.clone());
    let container = host.create_container("app");
    let root = reconciler.create_container(container)?;
    let list = Component::named("TodoList", todo_list);

    let run = || {
        while host.flush_microtasks() > 0 || scheduler.run_until_idle() > 0 {}
    };

    for (step, items) in [
        ("mount", "milk,eggs,bread"),
        ("rotate", "eggs,bread,milk"),
        ("move last to front", "milk,eggs,bread"),
        ("remove and add", "milk,bread,jam"),
    ] {
        reconciler.update_container(component(&list).attr("items", items), root)?;
        run();
        print_ops(step, &host)?;
        println!("  {}", host.render_to_string(container));
    }

    if let Some(target) = host.find_by_attr(container, "id", "jam") {
        reconciler.discrete_updates(|| host.dispatch_event(target, "click"));
        run();
        print_ops("click", &host)?;
        println!("  {}", host.render_to_string(container));
    }

    reconciler.unmount_container(root)?;
    run();
    print_ops("unmount", &host)?;
    println!("live fibers after unmount: {}", reconciler.live_fibers());
    logging::flush();
    Ok(())
}
