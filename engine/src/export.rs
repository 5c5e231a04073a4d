//! Stateless export transforms over a highlight list.

use crate::{error::EngineError, record::HighlightRecord};

/// Pretty-printed JSON of the records, exactly as persisted.
pub fn to_pretty_json(records: &[HighlightRecord]) -> Result<String, EngineError> {
    serde_json::to_string_pretty(records)
        .map_err(|e| EngineError::StorageUnavailable(e.to_string()))
}

/// Markdown list rendering: one `"text" — note — created` bullet per
/// record; the note segment is dropped when empty.
pub fn to_markdown(records: &[HighlightRecord]) -> String {
    let mut out = String::from("# Highlights\n\n");
    for record in records {
        out.push_str(&format!("- \"{}\"", record.anchor.selected_text));
        if !record.note.is_empty() {
            out.push_str(&format!(" — {}", record.note));
        }
        out.push_str(&format!(" — {}\n", record.created));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::test_support::record;

    #[test]
    fn test_json_export_is_parseable_and_pretty() {
        let records = vec![record("h1", "conv-1", "2024-05-01T09:00:00.000Z")];
        let json = to_pretty_json(&records).unwrap();
        assert!(json.contains('\n'));
        let back: Vec<HighlightRecord> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, records);
    }

    #[test]
    fn test_markdown_lists_text_note_created() {
        let mut with_note = record("h1", "conv-1", "2024-05-01T09:00:00.000Z");
        with_note.note = "worth remembering".into();
        let without_note = record("h2", "conv-1", "2024-05-01T10:00:00.000Z");
        let md = to_markdown(&[with_note, without_note]);
        assert!(md.contains("- \"selected\" — worth remembering — 2024-05-01T09:00:00.000Z"));
        assert!(md.contains("- \"selected\" — 2024-05-01T10:00:00.000Z"));
    }
}
