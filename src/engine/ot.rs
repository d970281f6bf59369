use std::collections::VecDeque;

use tracing::debug;
use uuid::Uuid;

use crate::models::{Operation, OperationKind};

/// Byte offset of the zero-based character position `pos`, clamped to the
/// end of the text. Positions on the wire are character offsets, never bytes.
fn byte_offset(text: &str, pos: usize) -> usize {
    text.char_indices().nth(pos).map(|(i, _)| i).unwrap_or(text.len())
}

/// Apply a single operation to the document text, returning the new text.
/// Retain and format operations carry metadata only and leave the text as is.
pub fn apply_operation(text: &str, op: &Operation) -> String {
    match op.kind {
        OperationKind::Insert => {
            let content = op.content.as_deref().unwrap_or("");
            let at = byte_offset(text, op.position);
            let mut out = String::with_capacity(text.len() + content.len());
            out.push_str(&text[..at]);
            out.push_str(content);
            out.push_str(&text[at..]);
            out
        }
        OperationKind::Delete => {
            let start = byte_offset(text, op.position);
            let end = byte_offset(text, op.position.saturating_add(op.delete_len()));
            let mut out = String::with_capacity(text.len());
            out.push_str(&text[..start]);
            out.push_str(&text[end..]);
            out
        }
        OperationKind::Retain | OperationKind::Format => text.to_string(),
    }
}

/// Rewrite `local` so it keeps its intended effect after `remote` has been
/// applied first.
///
/// Only insert/insert and remote-delete/local-insert have defined
/// transforms; every other pairing passes through unchanged. That mirrors
/// the simplified pairwise model this engine implements, it is not a full
/// transform library.
pub fn transform_operation(remote: &Operation, local: &Operation) -> Operation {
    let mut transformed = local.clone();
    match (remote.kind, local.kind) {
        (OperationKind::Insert, OperationKind::Insert) => {
            if remote.position <= local.position {
                transformed.position = local.position.saturating_add(remote.content_len());
            }
        }
        (OperationKind::Delete, OperationKind::Insert) => {
            if remote.position < local.position {
                transformed.position = local.position.saturating_sub(remote.delete_len());
            }
        }
        _ => {}
    }
    transformed
}

/// Fold adjacent, textually contiguous operations of the same kind by the
/// same author into one. Everything else passes through in order.
pub fn compose_operations(ops: Vec<Operation>) -> Vec<Operation> {
    let mut composed: Vec<Operation> = Vec::with_capacity(ops.len());
    for op in ops {
        match composed.last_mut() {
            Some(prev) if can_merge(prev, &op) => merge_into(prev, &op),
            _ => composed.push(op),
        }
    }
    composed
}

fn can_merge(prev: &Operation, next: &Operation) -> bool {
    if prev.author_id != next.author_id || prev.kind != next.kind {
        return false;
    }
    match prev.kind {
        // Insert runs are contiguous when the second starts where the first ends.
        OperationKind::Insert => prev.position.saturating_add(prev.content_len()) == next.position,
        // Repeated deletes at the same offset eat forward through the text.
        OperationKind::Delete => prev.position == next.position,
        _ => false,
    }
}

fn merge_into(prev: &mut Operation, next: &Operation) {
    match prev.kind {
        OperationKind::Insert => {
            let mut content = prev.content.take().unwrap_or_default();
            content.push_str(next.content.as_deref().unwrap_or(""));
            prev.content = Some(content);
        }
        OperationKind::Delete => {
            prev.length = Some(prev.delete_len() + next.delete_len());
        }
        _ => {}
    }
    prev.timestamp = next.timestamp;
}

/// Operations authored locally that the relay has not acknowledged yet.
/// They form the tentative overlay on top of the confirmed document.
#[derive(Default)]
pub struct PendingOperations {
    queue: VecDeque<Operation>,
}

impl PendingOperations {
    pub fn push(&mut self, op: Operation) {
        self.queue.push_back(op);
    }

    /// Rewrite every pending operation against an incoming remote one,
    /// preserving queue order. A no-op on an empty queue.
    pub fn transform_against(&mut self, remote: &Operation) {
        for local in self.queue.iter_mut() {
            let transformed = transform_operation(remote, local);
            if transformed.position != local.position {
                debug!(
                    "Transformed pending operation {} position {} -> {}",
                    local.id, local.position, transformed.position
                );
            }
            *local = transformed;
        }
    }

    /// Drop the pending entry the relay just acknowledged. Returns the
    /// operation if it was known.
    pub fn acknowledge(&mut self, id: Uuid) -> Option<Operation> {
        let idx = self.queue.iter().position(|op| op.id == id)?;
        self.queue.remove(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.queue.iter()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}
