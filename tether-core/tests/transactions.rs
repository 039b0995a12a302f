use parking_lot::Mutex;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tether_core::{
    AppConfig, Application, Command, ContextStack, DiffLog, NoValidation, Node, NodeId,
    OpenFeatures, OutputProcessor, PropertyValue, RenderContext, SyncError, SyncRequest,
    Synchronization, Transaction, TreeError, UpdateBatch, Window, WindowContext, WindowId,
};

/// What a renderer saw for one update record
#[derive(Debug, Default, Clone, PartialEq)]
struct Seen {
    node: Option<NodeId>,
    added: Vec<NodeId>,
    removed: Vec<NodeId>,
    removed_descendants: usize,
    properties: Vec<(String, PropertyValue, PropertyValue)>,
}

fn summarize(batch: &UpdateBatch) -> Vec<Seen> {
    batch
        .updates()
        .map(|update| Seen {
            node: Some(update.node()),
            added: update.added_children().collect(),
            removed: update.removed_children().map(|(_, node)| node).collect(),
            removed_descendants: update.removed_descendant_count(),
            properties: update
                .properties()
                .map(|(name, change)| (name.to_string(), change.old.clone(), change.new.clone()))
                .collect(),
        })
        .collect()
}

struct Capture;

impl OutputProcessor for Capture {
    type Output = Vec<Seen>;

    fn render(&mut self, cx: &mut RenderContext<'_>) -> anyhow::Result<Vec<Seen>> {
        Ok(summarize(cx.batch()))
    }
}

fn run<F>(app: &Application, window: &WindowId, input: F) -> Vec<Seen>
where
    F: FnOnce(&mut WindowContext<'_>) -> anyhow::Result<()>,
{
    let mut txn = app.begin_transaction(window).unwrap();
    txn.apply_input(input).unwrap();
    txn.validate(&mut NoValidation).unwrap();
    txn.compute_diff().unwrap();
    let seen = txn.render(&mut Capture).unwrap();
    txn.commit().unwrap();
    seen
}

/// Application whose main window holds a registered content pane
fn app_with_content() -> (Application, WindowId, NodeId) {
    let app = Application::new(AppConfig::default());
    let mut content = None;
    let main = app
        .open_window(|window| {
            let root = window.root();
            let pane = window.create_node(Node::new("ContentPane"));
            window.add_child(root, pane)?;
            content = Some(pane);
            Ok(())
        })
        .unwrap();
    (app, main, content.unwrap())
}

fn attach(cx: &mut WindowContext<'_>, parent: NodeId, kind: &str) -> anyhow::Result<NodeId> {
    let node = cx.create_node(Node::new(kind));
    cx.add_child(parent, node)?;
    Ok(node)
}

#[test]
fn test_end_to_end_add_then_remove() {
    let (app, main, content) = app_with_content();

    let mut children = Vec::new();
    let seen = run(&app, &main, |cx| {
        for kind in ["Label", "Button", "TextField"] {
            children.push(attach(cx, content, kind)?);
        }
        Ok(())
    });
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].node, Some(content));
    assert_eq!(seen[0].added, children);
    assert!(seen[0].removed.is_empty());

    let middle = children[1];
    let seen = run(&app, &main, |cx| {
        cx.remove_child(content, middle)?;
        Ok(())
    });
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].removed, vec![middle]);
    assert_eq!(seen[0].removed_descendants, 0);
    assert!(seen[0].added.is_empty());
}

#[test]
fn test_property_changes_coalesce_across_one_transaction() {
    let (app, main, content) = app_with_content();
    let label = {
        let mut label = None;
        run(&app, &main, |cx| {
            let node = cx.create_node(Node::new("Label").with_property("text", "a"));
            cx.add_child(content, node)?;
            label = Some(node);
            Ok(())
        });
        label.unwrap()
    };

    let seen = run(&app, &main, |cx| {
        cx.set_property(label, "text", "b")?;
        cx.set_property(label, "text", "c")?;
        Ok(())
    });
    assert_eq!(
        seen[0].properties,
        vec![("text".to_string(), PropertyValue::from("a"), PropertyValue::from("c"))]
    );

    let seen = run(&app, &main, |cx| {
        cx.set_property(label, "text", "d")?;
        cx.set_property(label, "text", "c")?;
        Ok(())
    });
    assert!(seen.is_empty());
}

#[test]
fn test_add_then_remove_in_one_transaction_vanishes() {
    let (app, main, content) = app_with_content();
    let seen = run(&app, &main, |cx| {
        let pane = attach(cx, content, "Pane")?;
        let label = attach(cx, pane, "Label")?;
        cx.set_property(label, "text", "x")?;
        cx.set_layout_data(pane, Some(PropertyValue::Int(2)))?;
        cx.remove_child(content, pane)?;
        Ok(())
    });
    assert!(seen.is_empty());
}

#[test]
fn test_removing_subtree_yields_single_record() {
    let (app, main, content) = app_with_content();
    let mut parent = None;
    run(&app, &main, |cx| {
        let pane = attach(cx, content, "Pane")?;
        let column = attach(cx, pane, "Column")?;
        attach(cx, column, "Label")?;
        let row = attach(cx, column, "Row")?;
        attach(cx, row, "Button")?;
        attach(cx, pane, "Label")?;
        parent = Some(pane);
        Ok(())
    });
    let pane = parent.unwrap();

    let seen = run(&app, &main, |cx| {
        // touch a descendant first; its record must be absorbed
        let column = cx.node(pane)?.children()[0];
        cx.set_property(column, "spacing", 4)?;
        cx.remove_child(content, pane)?;
        Ok(())
    });
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].node, Some(content));
    assert_eq!(seen[0].removed, vec![pane]);
    assert_eq!(seen[0].removed_descendants, 5);
}

struct RecordStates {
    targets: Vec<NodeId>,
}

impl OutputProcessor for RecordStates {
    type Output = Vec<Option<String>>;

    fn render(&mut self, cx: &mut RenderContext<'_>) -> anyhow::Result<Self::Output> {
        let before = self
            .targets
            .iter()
            .map(|node| cx.render_state::<String>(*node).cloned())
            .collect();
        for node in &self.targets {
            if cx.tree().is_attached(*node) {
                cx.set_render_state(*node, format!("html for {node}"));
            }
        }
        Ok(before)
    }
}

#[test]
fn test_render_state_evicted_with_removed_descendants_only() {
    let (app, main, content) = app_with_content();

    let mut ids = None;
    let mut txn = app.begin_transaction(&main).unwrap();
    txn.apply_input(|cx| {
        let wrapper = attach(cx, content, "Pane")?;
        let x = attach(cx, wrapper, "Label")?;
        let sibling = attach(cx, content, "Label")?;
        ids = Some((wrapper, x, sibling));
        Ok(())
    })
    .unwrap();
    let (wrapper, x, sibling) = ids.unwrap();
    txn.validate(&mut NoValidation).unwrap();
    txn.compute_diff().unwrap();
    let mut output = RecordStates {
        targets: vec![x, sibling],
    };
    assert_eq!(txn.render(&mut output).unwrap(), vec![None, None]);
    txn.commit().unwrap();

    let mut txn = app.begin_transaction(&main).unwrap();
    txn.apply_input(|cx| {
        cx.set_property(sibling, "text", "changed")?;
        cx.remove_child(content, wrapper)?;
        Ok(())
    })
    .unwrap();
    txn.validate(&mut NoValidation).unwrap();
    let batch = txn.compute_diff().unwrap();
    assert!(batch.update(content).unwrap().is_removed(x));

    assert!(txn.window().render_state::<String>(x).is_none());
    assert_eq!(
        txn.window().render_state::<String>(sibling),
        Some(&format!("html for {sibling}"))
    );
    let before = txn.render(&mut output).unwrap();
    assert_eq!(before, vec![None, Some(format!("html for {sibling}"))]);
    txn.commit().unwrap();
}

#[test]
fn test_remove_readd_remove_in_one_transaction() {
    let (app, main, content) = app_with_content();

    let mut label = None;
    let mut txn = app.begin_transaction(&main).unwrap();
    txn.apply_input(|cx| {
        label = Some(attach(cx, content, "Label")?);
        Ok(())
    })
    .unwrap();
    let label = label.unwrap();
    txn.validate(&mut NoValidation).unwrap();
    txn.compute_diff().unwrap();
    let mut output = RecordStates {
        targets: vec![label],
    };
    txn.render(&mut output).unwrap();
    txn.commit().unwrap();

    let mut txn = app.begin_transaction(&main).unwrap();
    txn.apply_input(|cx| {
        cx.remove_child(content, label)?;
        cx.add_child(content, label)?;
        cx.remove_child(content, label)?;
        Ok(())
    })
    .unwrap();
    txn.validate(&mut NoValidation).unwrap();
    let seen = summarize(txn.compute_diff().unwrap());
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].node, Some(content));
    assert_eq!(seen[0].removed, vec![label]);
    assert!(seen[0].added.is_empty());
    assert_eq!(seen[0].removed_descendants, 0);
    assert!(txn.window().render_state::<String>(label).is_none());
    txn.render(&mut Capture).unwrap();
    txn.commit().unwrap();

    let seen = run(&app, &main, |_| Ok(()));
    assert!(seen.is_empty());
}

struct Disconnected;

impl OutputProcessor for Disconnected {
    type Output = ();

    fn render(&mut self, _cx: &mut RenderContext<'_>) -> anyhow::Result<()> {
        anyhow::bail!("client disconnected")
    }
}

#[test]
fn test_pending_updates_survive_rejected_input() {
    let (app, main, content) = app_with_content();
    let label = app
        .switch_into(&mut ContextStack::new(), &main, |cx| attach(cx, content, "Label"))
        .unwrap()
        .unwrap();

    {
        let mut txn = app.begin_transaction(&main).unwrap();
        let err = txn.apply_input(|_| anyhow::bail!("truncated request")).unwrap_err();
        assert!(matches!(err, SyncError::Input(_)));
    }

    let mut txn = app.begin_transaction(&main).unwrap();
    txn.apply_input(|_| Ok(())).unwrap();
    txn.validate(&mut NoValidation).unwrap();
    let batch = txn.compute_diff().unwrap();
    assert!(!batch.is_full_refresh());
    let seen = summarize(batch);
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].added, vec![label]);
}

#[test]
fn test_pushed_batch_survives_failed_render() {
    let app = Application::new(AppConfig::default());
    let main = app.open_window(|_| Ok(())).unwrap();
    let second = app.open_window(|_| Ok(())).unwrap();

    let mut label = None;
    let mut txn = app.begin_transaction(&main).unwrap();
    txn.apply_input(|cx| {
        let second = second.clone();
        label = Some(cx.switch_into(&second, |other| {
            let root = other.root();
            attach(other, root, "Label")
        })??);
        Ok(())
    })
    .unwrap();
    let label = label.unwrap();
    txn.validate(&mut NoValidation).unwrap();
    txn.compute_diff().unwrap();
    txn.render(&mut Capture).unwrap();
    assert_eq!(txn.commit().unwrap().async_pushes, 1);

    {
        let mut txn = app.begin_transaction(&second).unwrap();
        txn.apply_input(|_| Ok(())).unwrap();
        txn.validate(&mut NoValidation).unwrap();
        txn.compute_diff().unwrap();
        assert_eq!(txn.pushed_updates().len(), 1);
        assert!(matches!(txn.render(&mut Disconnected), Err(SyncError::Render(_))));
    }
    assert!(app.has_async_updates(&second).unwrap());

    let mut txn = app.begin_transaction(&second).unwrap();
    txn.apply_input(|_| Ok(())).unwrap();
    txn.validate(&mut NoValidation).unwrap();
    assert!(!txn.compute_diff().unwrap().is_full_refresh());
    let pushed = txn.pushed_updates();
    assert_eq!(pushed.len(), 1);
    let seen = summarize(&pushed[0]);
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].added, vec![label]);
    txn.render(&mut Capture).unwrap();
    txn.commit().unwrap();
}

#[test]
fn test_commands_survive_failed_render_after_mutation() {
    let (app, main, content) = app_with_content();
    let second = app.open_window(|_| Ok(())).unwrap();
    let open = Command::OpenWindow {
        window: second,
        title: None,
        features: OpenFeatures::default(),
    };

    {
        let mut txn = app.begin_transaction(&main).unwrap();
        txn.apply_input(|cx| attach(cx, content, "Label").map(|_| ())).unwrap();
        txn.validate(&mut NoValidation).unwrap();
        assert_eq!(txn.compute_diff().unwrap().commands(), &[open.clone()]);
        assert!(txn.render(&mut Disconnected).is_err());
    }

    let mut txn = app.begin_transaction(&main).unwrap();
    txn.apply_input(|_| Ok(())).unwrap();
    txn.validate(&mut NoValidation).unwrap();
    let batch = txn.compute_diff().unwrap();
    assert!(batch.is_full_refresh());
    assert_eq!(batch.commands(), &[open]);
}

#[test]
fn test_concurrent_transactions_serialize() {
    let (app, main, content) = app_with_content();
    let app = Arc::new(app);
    let barrier = Arc::new(Barrier::new(2));

    let results: Vec<(String, Vec<String>)> = thread::scope(|scope| {
        let workers: Vec<_> = ["Alpha", "Beta"]
            .into_iter()
            .map(|kind| {
                let app = Arc::clone(&app);
                let barrier = Arc::clone(&barrier);
                let main = main.clone();
                scope.spawn(move || {
                    barrier.wait();
                    let mut txn = app.begin_transaction(&main).unwrap();
                    txn.apply_input(|cx| {
                        attach(cx, content, kind)?;
                        thread::sleep(Duration::from_millis(20));
                        attach(cx, content, kind)?;
                        Ok(())
                    })
                    .unwrap();
                    txn.validate(&mut NoValidation).unwrap();
                    let added: Vec<NodeId> = txn
                        .compute_diff()
                        .unwrap()
                        .update(content)
                        .map(|update| update.added_children().collect())
                        .unwrap_or_default();
                    let kinds: Vec<String> = added
                        .iter()
                        .map(|node| txn.window().node(*node).unwrap().kind().to_string())
                        .collect();
                    txn.render(&mut Capture).unwrap();
                    txn.commit().unwrap();
                    (kind.to_string(), kinds)
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    for (kind, kinds) in results {
        assert_eq!(kinds, vec![kind.clone(), kind]);
    }

    let mut stack = tether_core::ContextStack::new();
    let total = app
        .switch_into(&mut stack, &main, |cx| cx.tree().children(content).len())
        .unwrap();
    assert_eq!(total, 4);
}

#[test]
fn test_transaction_lock_times_out() {
    let app = Application::new(AppConfig::default().with_lock_timeout(Duration::from_millis(20)));
    let main = app.open_window(|_| Ok(())).unwrap();

    let held: Transaction<'_> = app.begin_transaction(&main).unwrap();
    thread::scope(|scope| {
        let app = &app;
        let main = &main;
        let attempt = scope.spawn(move || app.begin_transaction(main).map(|_| ()));
        assert!(matches!(attempt.join().unwrap(), Err(SyncError::LockTimeout(_))));
    });
    drop(held);
    assert!(app.begin_transaction(&main).is_ok());
}

#[test]
fn test_async_update_pushed_to_sibling_window() {
    let (tx, rx) = crossbeam_channel::unbounded();
    let app = Application::with_waker(AppConfig::default(), tx);
    let main = app.open_window(|_| Ok(())).unwrap();
    let second = app.open_window(|_| Ok(())).unwrap();

    let mut txn = app.begin_transaction(&main).unwrap();
    txn.apply_input(|cx| {
        let second = second.clone();
        cx.switch_into(&second, |other| {
            let root = other.root();
            attach(other, root, "Label").map(|_| ())
        })??;
        Ok(())
    })
    .unwrap();
    txn.validate(&mut NoValidation).unwrap();
    let commands = txn.compute_diff().unwrap().commands().to_vec();
    assert_eq!(
        commands,
        vec![Command::OpenWindow {
            window: second.clone(),
            title: None,
            features: OpenFeatures::default(),
        }]
    );
    txn.render(&mut Capture).unwrap();
    let summary = txn.commit().unwrap();
    assert_eq!(summary.async_pushes, 1);

    assert!(app.has_async_updates(&second).unwrap());
    assert!(rx.try_iter().any(|woken| woken == second));

    let mut txn = app.begin_transaction(&second).unwrap();
    txn.apply_input(|_| Ok(())).unwrap();
    txn.validate(&mut NoValidation).unwrap();
    assert_eq!(txn.compute_diff().unwrap().update_count(), 0);
    let pushed = txn.pushed_updates();
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0].update_count(), 1);
    txn.render(&mut Capture).unwrap();
    txn.commit().unwrap();
    assert!(!app.has_async_updates(&second).unwrap());
}

#[test]
fn test_no_async_push_with_single_window() {
    let app = Application::new(AppConfig::default());
    let main = app.open_window(|_| Ok(())).unwrap();
    let mut txn = app.begin_transaction(&main).unwrap();
    txn.apply_input(|_| Ok(())).unwrap();
    txn.validate(&mut NoValidation).unwrap();
    txn.compute_diff().unwrap();
    txn.render(&mut Capture).unwrap();
    assert_eq!(txn.commit().unwrap().async_pushes, 0);
}

#[test]
fn test_synchronization_driver_init_request() {
    let (app, main, content) = app_with_content();
    let sync = Synchronization::new(&app);
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let mut output = DiffLog::with_buffer(buffer.clone());

    let mut input = |cx: &mut WindowContext<'_>| -> anyhow::Result<()> {
        attach(cx, content, "Label")?;
        Ok(())
    };
    let outcome = sync
        .process(&SyncRequest::init(main.clone()), &mut input, &mut NoValidation, &mut output)
        .unwrap();
    assert_eq!(outcome.output, vec!["full refresh".to_string()]);
    assert!(outcome.summary.full_refresh);
    assert_eq!(buffer.lock().len(), 1);

    let mut input = |cx: &mut WindowContext<'_>| -> anyhow::Result<()> {
        attach(cx, content, "Button")?;
        Ok(())
    };
    let outcome = sync
        .process(&SyncRequest::new(main), &mut input, &mut NoValidation, &mut output)
        .unwrap();
    assert_eq!(outcome.output.len(), 1);
    assert!(outcome.output[0].starts_with("add c_"));
    assert!(!outcome.summary.full_refresh);
}

#[test]
fn test_validation_failure_purges_and_releases() {
    let (app, main, content) = app_with_content();
    let sync = Synchronization::new(&app);
    let mut input = |cx: &mut WindowContext<'_>| -> anyhow::Result<()> {
        attach(cx, content, "Label")?;
        Ok(())
    };
    let mut validator = |cx: &mut WindowContext<'_>, node: NodeId| -> anyhow::Result<()> {
        if cx.node(node)?.kind() == "Label" {
            anyhow::bail!("label without text");
        }
        Ok(())
    };
    let err = sync
        .process(&SyncRequest::new(main.clone()), &mut input, &mut validator, &mut Capture)
        .unwrap_err();
    assert!(matches!(err, SyncError::Validation { .. }));

    let mut txn = app.begin_transaction(&main).unwrap();
    txn.apply_input(|_| Ok(())).unwrap();
    txn.validate(&mut NoValidation).unwrap();
    let batch = txn.compute_diff().unwrap();
    assert!(batch.is_full_refresh());
    assert_eq!(batch.update_count(), 0);
}

#[test]
fn test_locale_change_forces_full_refresh() {
    let (app, main, _) = app_with_content();
    app.set_locale("de-DE");
    let mut txn = app.begin_transaction(&main).unwrap();
    txn.apply_input(|_| Ok(())).unwrap();
    txn.validate(&mut NoValidation).unwrap();
    assert!(txn.compute_diff().unwrap().is_full_refresh());
}

#[test]
fn test_deferred_task_from_another_thread() {
    let (tx, rx) = crossbeam_channel::unbounded();
    let app = Application::with_waker(AppConfig::default(), tx);
    let main = app.open_window(|_| Ok(())).unwrap();
    let queue = app.create_task_queue(&main).unwrap();

    thread::scope(|scope| {
        scope.spawn(|| {
            app.enqueue_deferred(&main, queue, |cx| {
                let root = cx.root();
                cx.set_property(root, "title", "pushed")?;
                Ok(())
            })
            .unwrap();
        });
    });
    assert_eq!(rx.try_recv().ok(), Some(main.clone()));

    let seen = run(&app, &main, |_| Ok(()));
    assert_eq!(seen.len(), 1);
    assert_eq!(
        seen[0].properties,
        vec![("title".to_string(), PropertyValue::Nil, PropertyValue::from("pushed"))]
    );
}

#[test]
fn test_mutation_outside_context_fails_fast() {
    let mut window = Window::new(WindowId::from("loose"));
    let root = window.root();
    let label = window.create_node(Node::new("Label"));
    assert!(matches!(
        window.add_child(root, label),
        Err(TreeError::OutsideContext { .. })
    ));
    assert!(matches!(
        window.set_property(root, "title", "x"),
        Err(TreeError::OutsideContext { .. })
    ));

    let (app, main, content) = app_with_content();
    let mut stack = tether_core::ContextStack::new();
    app.switch_into(&mut stack, &main, |cx| {
        assert!(cx.is_active());
        cx.set_property(content, "title", "inside")
    })
    .unwrap()
    .unwrap();
    assert_eq!(stack.depth(), 0);
}
