//! Per-conversation highlight ordering and the navigation cursor.
//!
//! The index holds the conversation's highlights sorted by creation time
//! ascending and a cursor that is either -1 ("no active highlight") or a
//! valid list position. Navigation is debounced: a request arriving within
//! the debounce window of the previous one is rejected outright.

use crate::record::HighlightRecord;

/// Cursor value meaning "no active highlight".
pub const NO_CURSOR: isize = -1;

/// Ordered highlight list plus cursor for one conversation.
#[derive(Debug, Clone, Default)]
pub struct NavigationIndex {
    conversation_id: String,
    bookmarks: Vec<HighlightRecord>,
    cursor: isize,
    last_navigation_ms: Option<u64>,
}

impl NavigationIndex {
    pub fn new(conversation_id: &str) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            bookmarks: Vec::new(),
            cursor: NO_CURSOR,
            last_navigation_ms: None,
        }
    }

    #[inline]
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    #[inline]
    pub fn bookmarks(&self) -> &[HighlightRecord] {
        &self.bookmarks
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bookmarks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bookmarks.is_empty()
    }

    #[inline]
    pub fn cursor(&self) -> isize {
        self.cursor
    }

    /// The record under the cursor, if the cursor is set.
    pub fn current(&self) -> Option<&HighlightRecord> {
        usize::try_from(self.cursor)
            .ok()
            .and_then(|i| self.bookmarks.get(i))
    }

    /// Replaces the list (sorted by creation ascending) and resets the
    /// cursor.
    pub fn set_bookmarks(&mut self, mut records: Vec<HighlightRecord>) {
        sort_by_created(&mut records);
        self.bookmarks = records;
        self.cursor = NO_CURSOR;
    }

    /// Replaces the list but keeps the cursor on the same highlight when it
    /// still exists; otherwise the cursor resets.
    pub fn refresh(&mut self, mut records: Vec<HighlightRecord>) {
        let current_id = self.current().map(|r| r.id.clone());
        sort_by_created(&mut records);
        self.bookmarks = records;
        self.cursor = match current_id
            .and_then(|id| self.bookmarks.iter().position(|r| r.id == id))
        {
            Some(idx) => idx as isize,
            None => NO_CURSOR,
        };
    }

    /// Inserts a record at its chronological position.
    pub fn add(&mut self, record: HighlightRecord) {
        let current_id = self.current().map(|r| r.id.clone());
        self.bookmarks.push(record);
        sort_by_created(&mut self.bookmarks);
        if let Some(id) = current_id {
            if let Some(idx) = self.bookmarks.iter().position(|r| r.id == id) {
                self.cursor = idx as isize;
            }
        }
    }

    /// Removes a record by id. The cursor follows the record it pointed at,
    /// or resets when that record is the one removed.
    pub fn remove(&mut self, id: &str) -> bool {
        let Some(idx) = self.bookmarks.iter().position(|r| r.id == id) else {
            return false;
        };
        self.bookmarks.remove(idx);
        let idx = idx as isize;
        if self.cursor == idx {
            self.cursor = NO_CURSOR;
        } else if self.cursor > idx {
            self.cursor -= 1;
        }
        true
    }

    /// Clears everything, e.g. on conversation change.
    pub fn clear(&mut self, conversation_id: &str) {
        self.conversation_id = conversation_id.to_string();
        self.bookmarks.clear();
        self.cursor = NO_CURSOR;
        self.last_navigation_ms = None;
    }

    /// Moves the cursor to the highlight with the given id. `None` when the
    /// id is unknown or the request falls inside the debounce window; the
    /// cursor is left unchanged in both cases.
    pub fn navigate_to(&mut self, id: &str, now_ms: u64, debounce_ms: u64) -> Option<usize> {
        if self.debounced(now_ms, debounce_ms) {
            return None;
        }
        let idx = self.bookmarks.iter().position(|r| r.id == id)?;
        self.cursor = idx as isize;
        self.last_navigation_ms = Some(now_ms);
        Some(idx)
    }

    /// Advances the cursor by one. Refuses to move past the last entry.
    pub fn navigate_next(&mut self, now_ms: u64, debounce_ms: u64) -> Option<usize> {
        if self.debounced(now_ms, debounce_ms) || self.bookmarks.is_empty() {
            return None;
        }
        let next = self.cursor + 1;
        if next as usize >= self.bookmarks.len() {
            return None;
        }
        self.cursor = next;
        self.last_navigation_ms = Some(now_ms);
        Some(next as usize)
    }

    /// Retreats the cursor by one. Refuses to move before the first entry.
    pub fn navigate_previous(&mut self, now_ms: u64, debounce_ms: u64) -> Option<usize> {
        if self.debounced(now_ms, debounce_ms) || self.cursor <= 0 {
            return None;
        }
        self.cursor -= 1;
        self.last_navigation_ms = Some(now_ms);
        Some(self.cursor as usize)
    }

    fn debounced(&self, now_ms: u64, debounce_ms: u64) -> bool {
        match self.last_navigation_ms {
            Some(last) if now_ms.saturating_sub(last) < debounce_ms => {
                log::trace!(
                    "navigation rejected, {}ms since previous request",
                    now_ms.saturating_sub(last)
                );
                true
            }
            _ => false,
        }
    }
}

fn sort_by_created(records: &mut [HighlightRecord]) {
    records.sort_by(|a, b| {
        a.created_at()
            .cmp(&b.created_at())
            .then_with(|| a.id.cmp(&b.id))
    });
}
