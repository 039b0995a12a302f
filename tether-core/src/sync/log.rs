use super::synchronization::{OutputProcessor, RenderContext};
use crate::tree::{NodeId, Tree};
use crate::update::UpdateBatch;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// Output processor that describes each diff as text lines
///
/// Useful for debugging and for tests; nothing is actually rendered.
#[derive(Default)]
pub struct DiffLog {
    buffer: Option<Arc<Mutex<Vec<String>>>>,
}

impl DiffLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also append every line to a shared buffer
    pub fn with_buffer(buffer: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            buffer: Some(buffer),
        }
    }

    /// Describe one batch against the tree it was recorded on
    pub fn describe(tree: &Tree, batch: &UpdateBatch) -> Vec<String> {
        let rid = |node: NodeId| {
            tree.get(node)
                .and_then(|n| n.render_id())
                .map(|id| id.to_string())
                .unwrap_or_else(|| node.to_string())
        };

        let mut lines = Vec::new();
        if batch.is_full_refresh() {
            lines.push("full refresh".to_string());
        }
        for update in batch.updates() {
            let parent = rid(update.node());
            for (id, _) in update.removed_children() {
                lines.push(format!("remove {id} from {parent}"));
            }
            if update.removed_descendant_count() > 0 {
                lines.push(format!(
                    "remove {} descendants under {parent}",
                    update.removed_descendant_count()
                ));
            }
            for child in update.added_children() {
                lines.push(format!("add {} to {parent}", rid(child)));
            }
            for (name, change) in update.properties() {
                lines.push(format!("set {parent}.{name} = {}", change.new.to_json()));
            }
            for child in update.layout_data_updates() {
                lines.push(format!("layout {} in {parent}", rid(child)));
            }
        }
        for (name, change) in batch.window_properties() {
            lines.push(format!("window.{name} = {}", change.new.to_json()));
        }
        for command in batch.commands() {
            lines.push(format!("command {}", command.name()));
        }
        lines
    }
}

impl OutputProcessor for DiffLog {
    type Output = Vec<String>;

    fn render(&mut self, cx: &mut RenderContext<'_>) -> anyhow::Result<Vec<String>> {
        let mut lines = Vec::new();
        for pushed in cx.pushed() {
            lines.extend(
                Self::describe(cx.tree(), pushed)
                    .into_iter()
                    .map(|line| format!("pushed: {line}")),
            );
        }
        lines.extend(Self::describe(cx.tree(), cx.batch()));

        if tracing::event_enabled!(tracing::Level::DEBUG) {
            for line in &lines {
                debug!(window = %cx.window_id(), txn = cx.transaction_id(), "{line}");
            }
        }
        if let Some(buffer) = &self.buffer {
            buffer.lock().extend(lines.iter().cloned());
        }
        Ok(lines)
    }
}
