//! The session object binding one document, one conversation and one
//! storage backend.
//!
//! Hosts hand the session a tree, a conversation id, a store and a clock;
//! the session owns the renderer, the navigation index and the storage
//! gateway and exposes every public operation. There is no process-wide
//! state anywhere in the engine; dropping the session drops everything.

use std::sync::Arc;

use tidemark_anchor::{
    create_anchor, resolve_anchor, Anchor, AnchorError, ResolvedAnchor,
};
use tidemark_core::{Document, NodeId, TextRange};

use crate::{
    clock::Clock,
    config::EngineConfig,
    error::EngineError,
    export,
    navigation::NavigationIndex,
    record::{HighlightRecord, Platform},
    renderer::{HighlightRenderer, RenderResult, RestoreResult},
    storage::{HighlightFilter, KeyValueStore, StorageGateway, UpdatePatch},
};

/// What the host's selection source produces: a validated range plus the
/// identifiers of the message and conversation it came from.
#[derive(Debug, Clone)]
pub struct Selection {
    pub range: TextRange,
    pub message_id: String,
    pub conversation_id: String,
}

/// Optional capability that scrolls an element into the visible region.
/// Failure is non-fatal everywhere it is used.
pub trait ViewBringer: Send + Sync {
    fn bring_into_view(&self, doc: &Document, node: NodeId) -> bool;
}

/// One annotation session over one conversation document.
pub struct Session {
    doc: Document,
    conversation_id: String,
    platform: Platform,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    renderer: HighlightRenderer,
    navigation: NavigationIndex,
    gateway: StorageGateway,
    view: Option<Box<dyn ViewBringer>>,
    id_sequence: u64,
}

impl Session {
    pub fn new(
        doc: Document,
        conversation_id: &str,
        platform: Platform,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        let renderer = HighlightRenderer::new(config.clone());
        let gateway = StorageGateway::new(store, clock.clone(), &config);
        Self {
            doc,
            conversation_id: conversation_id.to_string(),
            platform,
            config,
            clock,
            renderer,
            navigation: NavigationIndex::new(conversation_id),
            gateway,
            view: None,
            id_sequence: 0,
        }
    }

    pub fn with_view_bringer(mut self, view: Box<dyn ViewBringer>) -> Self {
        self.view = Some(view);
        self
    }

    #[inline]
    pub fn document(&self) -> &Document {
        &self.doc
    }

    #[inline]
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    #[inline]
    pub fn navigation(&self) -> &NavigationIndex {
        &self.navigation
    }

    #[inline]
    pub fn renderer(&self) -> &HighlightRenderer {
        &self.renderer
    }

    #[inline]
    pub fn storage(&mut self) -> &mut StorageGateway {
        &mut self.gateway
    }

    /// Creates an anchor from a host selection without persisting anything.
    pub fn create_anchor(&self, selection: &Selection) -> Result<Anchor, EngineError> {
        create_anchor(
            &self.doc,
            &selection.range,
            Some(&selection.message_id),
            &self.config.anchor,
        )
        .map_err(|err| match err {
            AnchorError::InvalidSelection(why) => EngineError::InvalidSelection(why),
        })
    }

    /// Resolves an anchor against the session's current tree.
    pub fn resolve_anchor(&self, anchor: &Anchor) -> Option<ResolvedAnchor> {
        resolve_anchor(&self.doc, anchor, &self.config.anchor)
    }

    /// The full bookmark flow: anchor the selection, persist a record,
    /// render it with a flash, and register it for navigation.
    pub async fn bookmark_selection(
        &mut self,
        selection: &Selection,
        note: &str,
        tags: Vec<String>,
        color: Option<String>,
    ) -> Result<HighlightRecord, EngineError> {
        let anchor = self.create_anchor(selection)?;
        let now = self.clock.now_iso8601();
        self.id_sequence += 1;
        let record = HighlightRecord {
            id: format!("hl-{}-{}", self.clock.monotonic_ms(), self.id_sequence),
            platform: self.platform.clone(),
            conversation_id: selection.conversation_id.clone(),
            message_id: selection.message_id.clone(),
            anchor,
            note: note.to_string(),
            tags,
            created: now.clone(),
            updated: now,
            color,
        };

        self.gateway.save_highlight(record.clone()).await?;
        self.renderer
            .render(&mut self.doc, &record, None, true, self.clock.as_ref())?;
        self.navigation.add(record.clone());
        log::debug!("bookmarked {} in {}", record.id, record.conversation_id);
        Ok(record)
    }

    /// Renders one stored highlight.
    pub fn render_highlight(
        &mut self,
        record: &HighlightRecord,
        style: Option<&str>,
        flash: bool,
    ) -> Result<RenderResult, EngineError> {
        self.renderer
            .render(&mut self.doc, record, style, flash, self.clock.as_ref())
    }

    /// Loads the conversation's highlights, renders them in batches, and
    /// optionally deep-links to one highlight id carried by the host URL.
    pub async fn initialize(
        &mut self,
        deep_link: Option<&str>,
    ) -> Result<RestoreResult, EngineError> {
        let filter = HighlightFilter::conversation(&self.conversation_id);
        let records = self.gateway.get_highlights(Some(&filter)).await?;
        self.navigation.set_bookmarks(records);

        let records = self.navigation.bookmarks().to_vec();
        let result = self
            .renderer
            .restore(
                &mut self.doc,
                &records,
                Some(self.config.restore_batch_size),
                self.clock.as_ref(),
                None,
            )
            .await;

        if let Some(id) = deep_link {
            if !self.navigate_to(id) {
                log::debug!("deep link {:?} not present in this conversation", id);
            }
        }
        Ok(result)
    }

    /// Moves the cursor to a highlight and brings it into view.
    pub fn navigate_to(&mut self, id: &str) -> bool {
        self.renderer.expire_flashes(&mut self.doc, self.clock.as_ref());
        let now = self.clock.monotonic_ms();
        if self
            .navigation
            .navigate_to(id, now, self.config.navigation_debounce_ms)
            .is_none()
        {
            return false;
        }
        self.show_current()
    }

    /// Advances to the next highlight in creation order.
    pub fn navigate_next(&mut self) -> bool {
        self.renderer.expire_flashes(&mut self.doc, self.clock.as_ref());
        let now = self.clock.monotonic_ms();
        if self
            .navigation
            .navigate_next(now, self.config.navigation_debounce_ms)
            .is_none()
        {
            return false;
        }
        self.show_current()
    }

    /// Retreats to the previous highlight in creation order.
    pub fn navigate_previous(&mut self) -> bool {
        self.renderer.expire_flashes(&mut self.doc, self.clock.as_ref());
        let now = self.clock.monotonic_ms();
        if self
            .navigation
            .navigate_previous(now, self.config.navigation_debounce_ms)
            .is_none()
        {
            return false;
        }
        self.show_current()
    }

    /// Re-renders the current highlight if needed and scrolls to it.
    /// View-bringer failure is non-fatal; the navigation itself stands.
    fn show_current(&mut self) -> bool {
        let Some(record) = self.navigation.current().cloned() else {
            return false;
        };
        if !self.renderer.is_active(&record.id) {
            if let Err(err) =
                self.renderer
                    .render(&mut self.doc, &record, None, true, self.clock.as_ref())
            {
                log::warn!("could not render {} for navigation: {}", record.id, err);
                return false;
            }
        }
        if let (Some(view), Some(overlay)) =
            (self.view.as_ref(), self.renderer.first_overlay(&record.id))
        {
            if !view.bring_into_view(&self.doc, overlay) {
                log::trace!("view bringer declined for {}", record.id);
            }
        }
        true
    }

    /// Reloads the conversation's records from storage, preserving the
    /// cursor when the current highlight survives.
    pub async fn refresh(&mut self) -> Result<(), EngineError> {
        let filter = HighlightFilter::conversation(&self.conversation_id);
        let records = self.gateway.get_highlights(Some(&filter)).await?;
        self.navigation.refresh(records);
        Ok(())
    }

    /// No-op when the id is unchanged; otherwise clears rendered state and
    /// re-initializes for the new conversation.
    pub async fn update_conversation(&mut self, conversation_id: &str) -> Result<bool, EngineError> {
        if conversation_id == self.conversation_id {
            return Ok(false);
        }
        self.renderer.clear_all(&mut self.doc);
        self.conversation_id = conversation_id.to_string();
        self.navigation.clear(conversation_id);
        self.initialize(None).await?;
        Ok(true)
    }

    /// Replaces the session's document (the host re-rendered the page) and
    /// restores every highlight onto the fresh tree.
    pub async fn replace_document(&mut self, doc: Document) -> Result<RestoreResult, EngineError> {
        self.renderer.clear_all(&mut self.doc);
        self.doc = doc;
        self.initialize(None).await
    }

    /// Removes every rendered highlight from the tree, reporting how many
    /// there were. Stored records are untouched.
    pub fn clear_highlights(&mut self) -> usize {
        self.renderer.clear_all(&mut self.doc)
    }

    /// Deletes a highlight everywhere: store, tree and navigation.
    pub async fn remove_highlight(&mut self, id: &str) -> Result<bool, EngineError> {
        let existed = self.gateway.delete_highlight(id).await?;
        self.renderer.remove(&mut self.doc, id);
        self.navigation.remove(id);
        Ok(existed)
    }

    /// Merges note/tags/color into a stored highlight and optionally
    /// restyles its overlays.
    pub async fn update_highlight(
        &mut self,
        id: &str,
        patch: UpdatePatch,
        style: Option<&str>,
    ) -> Result<HighlightRecord, EngineError> {
        let updated = self.gateway.update_highlight(id, patch).await?;
        if let Some(style) = style {
            self.renderer.update(&mut self.doc, id, style, None);
        }
        self.refresh().await?;
        Ok(updated)
    }

    /// Pretty JSON export of this conversation's highlights (or all of
    /// them with `filter = None`).
    pub async fn export_json(
        &mut self,
        filter: Option<&HighlightFilter>,
    ) -> Result<String, EngineError> {
        let records = self.gateway.get_highlights(filter).await?;
        export::to_pretty_json(&records)
    }

    /// Markdown export, same filtering rules as `export_json`.
    pub async fn export_markdown(
        &mut self,
        filter: Option<&HighlightFilter>,
    ) -> Result<String, EngineError> {
        let records = self.gateway.get_highlights(filter).await?;
        Ok(export::to_markdown(&records))
    }

    /// Flushes pending writes. Call before the session goes away.
    pub async fn shutdown(&mut self) -> Result<(), EngineError> {
        self.gateway.flush_pending().await
    }
}
