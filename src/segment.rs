//! Block segmentation: the page-by-page state machine that groups pages
//! sharing an (identifier, group key) pair into contiguous blocks.

use serde::Serialize;
use tracing::{debug, info};

use crate::config::{MissingIdentifier, SegmentationPolicy};
use crate::extract::ExtractedFields;
use crate::logging::SEGMENT;
use crate::page::Page;

/// A sealed, non-empty run of contiguous pages sharing one key pair.
#[derive(Debug, Clone, PartialEq)]
pub struct PageBlock {
    pub identifier: String,
    pub group_key: Option<String>,
    pages: Vec<Page>,
}

impl PageBlock {
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn start_index(&self) -> usize {
        self.pages[0].index
    }

    pub fn page_indices(&self) -> Vec<usize> {
        self.pages.iter().map(|p| p.index).collect()
    }

    /// Replace the last page with `f(last)`; interior pages are left alone.
    pub fn map_last_page<F>(mut self, f: F) -> PageBlock
    where
        F: FnOnce(&Page) -> Page,
    {
        if let Some(last) = self.pages.last_mut() {
            *last = f(last);
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    NoIdentifier,
    NoGroupKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Appended,
    Dropped(DropReason),
}

/// Outcome of feeding one page: what happened to it, and the block it sealed.
#[derive(Debug)]
pub struct Step {
    pub disposition: Disposition,
    pub sealed: Option<PageBlock>,
}

#[derive(Debug, Default)]
pub struct SegmentationState {
    pub current_identifier: Option<String>,
    pub current_group_key: Option<String>,
    pub buffer: Vec<Page>,
}

impl SegmentationState {
    fn seal(&mut self) -> Option<PageBlock> {
        if self.buffer.is_empty() {
            return None;
        }
        let identifier = self.current_identifier.clone()?;
        let pages = std::mem::take(&mut self.buffer);
        debug_assert!(pages.windows(2).all(|w| w[1].index == w[0].index + 1));
        Some(PageBlock {
            identifier,
            group_key: self.current_group_key.clone(),
            pages,
        })
    }
}

#[derive(Debug)]
pub struct Segmenter {
    policy: SegmentationPolicy,
    state: SegmentationState,
}

impl Segmenter {
    pub fn new(policy: SegmentationPolicy) -> Self {
        Segmenter {
            policy,
            state: SegmentationState::default(),
        }
    }

    pub fn state(&self) -> &SegmentationState {
        &self.state
    }

    pub fn push(&mut self, page: Page, fields: ExtractedFields) -> Step {
        let state = &mut self.state;

        let inherited_identifier = fields.identifier.is_none();
        let Some(identifier) = fields
            .identifier
            .or_else(|| state.current_identifier.clone())
        else {
            info!(target: SEGMENT, page = page.number(), "no identifier and nothing to inherit, page dropped");
            return Step::dropped(DropReason::NoIdentifier);
        };

        let group_key = fields
            .group_key
            .or_else(|| state.current_group_key.clone());
        if group_key.is_none() && self.policy.require_group_key {
            info!(target: SEGMENT, page = page.number(), "no group key and nothing to inherit, page dropped");
            return Step::dropped(DropReason::NoGroupKey);
        }

        let changed = state.current_identifier.as_ref() != Some(&identifier)
            || state.current_group_key != group_key;
        let forced = inherited_identifier
            && self.policy.missing_identifier == MissingIdentifier::ForceBoundary;

        let sealed = if changed || forced {
            state.seal()
        } else {
            None
        };
        if let Some(block) = &sealed {
            debug!(
                target: SEGMENT,
                identifier = %block.identifier,
                group_key = ?block.group_key,
                pages = ?block.page_indices(),
                forced,
                "block sealed at boundary"
            );
        }

        state.current_identifier = Some(identifier);
        state.current_group_key = group_key;
        state.buffer.push(page);

        Step {
            disposition: Disposition::Appended,
            sealed,
        }
    }

    /// End of document: seal whatever is still open.
    pub fn finish(mut self) -> Option<PageBlock> {
        let block = self.state.seal();
        if let Some(block) = &block {
            debug!(
                target: SEGMENT,
                identifier = %block.identifier,
                group_key = ?block.group_key,
                pages = ?block.page_indices(),
                "block sealed at end of document"
            );
        }
        block
    }
}

impl Step {
    fn dropped(reason: DropReason) -> Self {
        Step {
            disposition: Disposition::Dropped(reason),
            sealed: None,
        }
    }
}

/// Run a whole page sequence through a fresh segmenter.
pub fn segment<I>(policy: SegmentationPolicy, pages: I) -> (Vec<PageBlock>, Vec<(usize, DropReason)>)
where
    I: IntoIterator<Item = (Page, ExtractedFields)>,
{
    let mut segmenter = Segmenter::new(policy);
    let mut blocks = Vec::new();
    let mut dropped = Vec::new();

    for (page, fields) in pages {
        let index = page.index;
        let step = segmenter.push(page, fields);
        if let Disposition::Dropped(reason) = step.disposition {
            dropped.push((index, reason));
        }
        blocks.extend(step.sealed);
    }
    blocks.extend(segmenter.finish());

    (blocks, dropped)
}
