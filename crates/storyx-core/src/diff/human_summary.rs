//! Human-readable summary renderer for change sets.

use crate::diff::model::{ChangeSet, FieldChange};
use crate::rules::classification::ChangeKind;
use serde_json::Value;

/// Render a Markdown summary of a [`ChangeSet`].
///
/// Intended for review displays. Sections appear in the order added,
/// removed, modified; rows within a section follow field-path order.
pub fn render_human_summary(set: &ChangeSet) -> String {
    let mut out = String::new();

    out.push_str("## Entity Changes\n\n");
    out.push_str(&format!(
        "**Entity**: `{}`  \n**From**: `{}`  \n**To**: `{}`\n\n",
        set.entity_id,
        short(&set.from_snapshot_id),
        short(&set.to_snapshot_id),
    ));

    if set.is_empty() {
        out.push_str("_No changes._\n");
        return out;
    }

    let counts = set.counts();
    out.push_str(&format!(
        "| Added | Removed | Modified | Total |\n|---|---|---|---|\n| {} | {} | {} | {} |\n\n",
        counts.added,
        counts.removed,
        counts.modified,
        counts.total()
    ));

    for (kind, title) in [
        (ChangeKind::Added, "Added"),
        (ChangeKind::Removed, "Removed"),
        (ChangeKind::Modified, "Modified"),
    ] {
        let rows: Vec<&FieldChange> = set.of_kind(kind).collect();
        if rows.is_empty() {
            continue;
        }
        out.push_str(&format!("### {}\n\n", title));
        for change in rows {
            out.push_str(&render_row(kind, change));
        }
        out.push('\n');
    }

    out
}

fn render_row(kind: ChangeKind, change: &FieldChange) -> String {
    let mut line = match kind {
        ChangeKind::Added => format!(
            "- `{}`: {}",
            change.field_path,
            display_value(change.new_value.as_ref())
        ),
        ChangeKind::Removed => format!(
            "- `{}`: ~~{}~~",
            change.field_path,
            display_value(change.old_value.as_ref())
        ),
        ChangeKind::Modified => format!(
            "- `{}`: {} → {}",
            change.field_path,
            display_value(change.old_value.as_ref()),
            display_value(change.new_value.as_ref())
        ),
    };
    if let Some(reason) = &change.change_reason {
        line.push_str(&format!(" _({})_", reason));
    }
    line.push('\n');
    if let Some(quote) = &change.source_text {
        line.push_str(&format!("  > {}\n", quote));
    }
    line
}

fn display_value(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => format!("\"{}\"", s),
        Some(other) => other.to_string(),
        None => "∅".to_string(),
    }
}

/// Show at most the first 8 characters of an id
fn short(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}
