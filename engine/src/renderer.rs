//! Composes anchor resolution, text wrapping and overlap resolution.
//!
//! The renderer owns the active map (highlight id to wrapped overlays) and
//! is the only component that directs tree mutation. Rendering is eager;
//! batch restore yields between batches so the host can process input, and
//! is cancellable at batch boundaries without leaving dangling overlays.

use std::{collections::BTreeMap, sync::atomic::{AtomicBool, Ordering}};

use futures_lite::future::yield_now;
use tidemark_anchor::{resolve_anchor, validate_anchor, AnchorStrategy};
use tidemark_core::{Document, NodeId};

use crate::{
    clock::{parse_iso8601, Clock},
    config::EngineConfig,
    error::EngineError,
    overlap::{
        apply_opacity_class, compute_extent, detect_overlaps, opacity_class,
        resolve_overlap_group, OpacityScale, OverlapInput,
    },
    record::HighlightRecord,
    wrapper::{TextWrapper, WrappedElement, DEFAULT_HIGHLIGHT_CLASS},
};

/// Transient class applied to freshly rendered highlights.
pub const FLASH_CLASS: &str = "tidemark-flash";

/// One rendered highlight in the active map.
#[derive(Debug, Clone)]
pub struct ActiveHighlight {
    pub id: String,
    pub elements: Vec<WrappedElement>,
    pub priority: i32,
    pub created_ms: i64,
    pub style_class: String,
}

/// What `render` reports back on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderResult {
    pub id: String,
    /// The strategy that resolved the anchor; hosts use it to update
    /// stored confidence.
    pub strategy: AnchorStrategy,
    pub elements_created: usize,
}

/// Tally of a batch restore.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreResult {
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    /// True when the host cancelled at a batch boundary.
    pub cancelled: bool,
}

/// Renders highlights into the document and keeps overlap classes current.
pub struct HighlightRenderer {
    config: EngineConfig,
    active: BTreeMap<String, ActiveHighlight>,
    flash_deadlines: Vec<(String, u64)>,
}

impl HighlightRenderer {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            active: BTreeMap::new(),
            flash_deadlines: Vec::new(),
        }
    }

    #[inline]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    #[inline]
    pub fn is_active(&self, id: &str) -> bool {
        self.active.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&ActiveHighlight> {
        self.active.get(id)
    }

    /// First overlay element of a highlight, the node the host scrolls to.
    pub fn first_overlay(&self, id: &str) -> Option<NodeId> {
        self.active
            .get(id)
            .and_then(|h| h.elements.first())
            .map(|e| e.overlay)
    }

    /// Resolves the record's anchor, wraps the range and registers the
    /// highlight. A highlight that is already active is re-rendered.
    pub fn render(
        &mut self,
        doc: &mut Document,
        record: &HighlightRecord,
        style: Option<&str>,
        flash: bool,
        clock: &dyn Clock,
    ) -> Result<RenderResult, EngineError> {
        let result = self.render_one(doc, record, style, flash, clock)?;
        self.refresh_overlaps(doc);
        Ok(result)
    }

    fn render_one(
        &mut self,
        doc: &mut Document,
        record: &HighlightRecord,
        style: Option<&str>,
        flash: bool,
        clock: &dyn Clock,
    ) -> Result<RenderResult, EngineError> {
        if !validate_anchor(&record.anchor) {
            return Err(EngineError::InvalidAnchor(format!(
                "highlight {} carries a structurally invalid anchor",
                record.id
            )));
        }
        if self.is_active(&record.id) {
            self.remove_inner(doc, &record.id);
        }

        let resolved = resolve_anchor(doc, &record.anchor, &self.config.anchor).ok_or(
            EngineError::ResolutionFailed {
                id: record.id.clone(),
            },
        )?;

        let style_class = style.unwrap_or(DEFAULT_HIGHLIGHT_CLASS).to_string();
        let outcome = TextWrapper::wrap_range(doc, &resolved.range, &record.id, &style_class);
        if outcome.wrapped.is_empty() {
            return Err(EngineError::WrapFailed {
                attempted: outcome.failures.len(),
                failures: outcome.failures.iter().map(|f| f.reason.clone()).collect(),
            });
        }
        if !outcome.failures.is_empty() {
            log::warn!(
                "highlight {} wrapped partially: {} of {} nodes failed",
                record.id,
                outcome.failures.len(),
                outcome.failures.len() + outcome.wrapped.len()
            );
        }

        if flash {
            for element in &outcome.wrapped {
                doc.data_mut(element.overlay).add_class(FLASH_CLASS);
            }
            self.flash_deadlines.push((
                record.id.clone(),
                clock.monotonic_ms() + self.config.flash_duration_ms,
            ));
        }

        let elements_created = outcome.wrapped.len();
        self.active.insert(
            record.id.clone(),
            ActiveHighlight {
                id: record.id.clone(),
                elements: outcome.wrapped,
                priority: 0,
                created_ms: parse_iso8601(&record.created)
                    .map(|dt| dt.timestamp_millis())
                    .unwrap_or(0),
                style_class,
            },
        );

        Ok(RenderResult {
            id: record.id.clone(),
            strategy: resolved.strategy,
            elements_created,
        })
    }

    /// Unwraps and forgets a highlight. Returns false for unknown ids.
    pub fn remove(&mut self, doc: &mut Document, id: &str) -> bool {
        let removed = self.remove_inner(doc, id);
        if removed {
            self.refresh_overlaps(doc);
        }
        removed
    }

    fn remove_inner(&mut self, doc: &mut Document, id: &str) -> bool {
        match self.active.remove(id) {
            Some(highlight) => {
                TextWrapper::remove_highlights(doc, &highlight.elements);
                self.flash_deadlines.retain(|(fid, _)| fid != id);
                true
            }
            None => false,
        }
    }

    /// Swaps the styling class and optionally the stored priority.
    pub fn update(
        &mut self,
        doc: &mut Document,
        id: &str,
        style: &str,
        priority: Option<i32>,
    ) -> bool {
        let Some(highlight) = self.active.get_mut(id) else {
            return false;
        };
        TextWrapper::update_styling(doc, &highlight.elements, &highlight.style_class, style);
        highlight.style_class = style.to_string();
        if let Some(priority) = priority {
            highlight.priority = priority;
        }
        self.refresh_overlaps(doc);
        true
    }

    /// Renders a batch of records, yielding between batches and counting
    /// successes, failures and error messages. A final overlap pass runs
    /// once at the end. Cancellation is honored at batch boundaries only;
    /// already-rendered highlights stay consistent.
    pub async fn restore(
        &mut self,
        doc: &mut Document,
        records: &[HighlightRecord],
        batch_size: Option<usize>,
        clock: &dyn Clock,
        cancel: Option<&AtomicBool>,
    ) -> RestoreResult {
        let batch_size = batch_size
            .unwrap_or(self.config.restore_batch_size)
            .max(1);
        let mut result = RestoreResult::default();

        for batch in records.chunks(batch_size) {
            if let Some(cancel) = cancel {
                if cancel.load(Ordering::Relaxed) {
                    result.cancelled = true;
                    break;
                }
            }
            for record in batch {
                match self.render_one(doc, record, None, false, clock) {
                    Ok(_) => result.succeeded += 1,
                    Err(err) => {
                        result.failed += 1;
                        result.errors.push(format!("{}: {}", record.id, err));
                    }
                }
            }
            yield_now().await;
        }

        self.refresh_overlaps(doc);
        log::debug!(
            "restore finished: {} ok, {} failed, cancelled={}",
            result.succeeded,
            result.failed,
            result.cancelled
        );
        result
    }

    /// Removes every active highlight and reports how many there were.
    pub fn clear_all(&mut self, doc: &mut Document) -> usize {
        let ids: Vec<String> = self.active.keys().cloned().collect();
        for id in &ids {
            self.remove_inner(doc, id);
        }
        self.flash_deadlines.clear();
        ids.len()
    }

    /// Drops the flash class from every highlight whose deadline passed.
    pub fn expire_flashes(&mut self, doc: &mut Document, clock: &dyn Clock) {
        let now = clock.monotonic_ms();
        let mut expired = Vec::new();
        self.flash_deadlines.retain(|(id, deadline)| {
            if *deadline <= now {
                expired.push(id.clone());
                false
            } else {
                true
            }
        });
        for id in expired {
            if let Some(highlight) = self.active.get(&id) {
                for element in &highlight.elements {
                    doc.data_mut(element.overlay).remove_class(FLASH_CLASS);
                }
            }
        }
    }

    /// Recomputes overlap groups and opacity classes for every active
    /// highlight. Runs after each create/remove/update and once per batch
    /// restore.
    pub fn refresh_overlaps(&mut self, doc: &mut Document) {
        let mut inputs = Vec::with_capacity(self.active.len());
        for highlight in self.active.values() {
            let Some(extent) = compute_extent(doc, &highlight.elements) else {
                continue;
            };
            inputs.push(OverlapInput {
                id: highlight.id.clone(),
                priority: highlight.priority,
                created_ms: highlight.created_ms,
                extent: (extent.start, extent.end),
                text_nodes: extent.text_nodes,
            });
        }

        let scale = OpacityScale {
            min: self.config.opacity_min,
            max: self.config.opacity_max,
            step: self.config.opacity_step,
        };
        for group in detect_overlaps(&inputs) {
            for (idx, opacity) in resolve_overlap_group(&group, &inputs, &scale) {
                let class = opacity_class(opacity);
                if let Some(highlight) = self.active.get(&inputs[idx].id) {
                    let elements = highlight.elements.clone();
                    apply_opacity_class(doc, &elements, &class);
                }
            }
        }
    }
}
