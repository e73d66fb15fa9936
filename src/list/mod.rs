//! Scroll and windowing model for the chat transcript.
//!
//! The model is UI-agnostic: the view reports scroll metrics and measured item
//! heights, and applies the `ScrollCommand` returned after each change to the
//! message collection. Without a mounted scroll container every scroll
//! operation is a no-op.

pub mod view;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListConfig {
    /// Item count at which rendering switches to windowed mode.
    pub windowing_threshold: usize,
    pub overscan: usize,
    pub estimated_item_height: f32,
    pub bottom_epsilon: f32,
    pub load_more_threshold: f32,
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            windowing_threshold: 50,
            overscan: 5,
            estimated_item_height: 120.0,
            bottom_epsilon: 50.0,
            load_more_threshold: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollAnchor {
    pub is_at_bottom: bool,
    pub first_visible_message_id: Option<String>,
}

impl Default for ScrollAnchor {
    fn default() -> Self {
        Self {
            is_at_bottom: true,
            first_visible_message_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    pub scroll_top: f32,
    pub scroll_height: f32,
    pub client_height: f32,
}

impl ScrollMetrics {
    fn distance_from_bottom(&self) -> f32 {
        self.scroll_height - self.scroll_top - self.client_height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollBehavior {
    Smooth,
    Instant,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollCommand {
    None,
    ToBottom(ScrollBehavior),
    ToOffset(f32),
}

/// What caused the message collection to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Growth {
    /// New messages, history pages, session switches.
    Organic,
    /// The streaming message received another delta.
    Streaming,
}

/// Pagination collaborator state as seen by the list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaginationState {
    pub has_more: bool,
    pub is_loading_more: bool,
}

#[derive(Debug)]
pub struct VirtualizedMessageList {
    config: ListConfig,
    anchor: ScrollAnchor,
    ids: Vec<String>,
    heights: HashMap<String, f32>,
    metrics: Option<ScrollMetrics>,
    anchor_adjustment_pending: bool,
    load_more_in_flight: bool,
    /// Set while an issued `ToBottom` has not yet shown up in a scroll report.
    follow_pending: bool,
    last_reported_top: Option<f32>,
}

impl VirtualizedMessageList {
    pub fn new(config: ListConfig) -> Self {
        Self {
            config,
            anchor: ScrollAnchor::default(),
            ids: Vec::new(),
            heights: HashMap::new(),
            metrics: None,
            anchor_adjustment_pending: false,
            load_more_in_flight: false,
            follow_pending: false,
            last_reported_top: None,
        }
    }

    pub fn anchor(&self) -> &ScrollAnchor {
        &self.anchor
    }

    #[cfg(test)]
    pub fn metrics(&self) -> Option<ScrollMetrics> {
        self.metrics
    }

    pub fn is_windowed(&self) -> bool {
        self.ids.len() >= self.config.windowing_threshold
    }

    pub fn is_loading_more(&self) -> bool {
        self.load_more_in_flight
    }

    pub fn item_height(&self, id: &str) -> f32 {
        self.heights
            .get(id)
            .copied()
            .unwrap_or(self.config.estimated_item_height)
    }

    /// Top edge of the item at `index` in content coordinates.
    pub fn offset_of(&self, index: usize) -> f32 {
        self.ids
            .iter()
            .take(index)
            .map(|id| self.item_height(id))
            .sum()
    }

    pub fn total_height(&self) -> f32 {
        self.offset_of(self.ids.len())
    }

    /// Handles a scroll event. Returns `true` when an older page should be requested.
    pub fn on_scroll(&mut self, metrics: ScrollMetrics, pager: PaginationState) -> bool {
        let previous_top = self.last_reported_top.replace(metrics.scroll_top);
        self.metrics = Some(metrics);
        if self.follow_pending {
            // A report may still show the viewport from before the scroll was applied.
            let reached = metrics.distance_from_bottom() < self.config.bottom_epsilon;
            let moved_up = previous_top.map_or(true, |top| metrics.scroll_top < top - 0.5);
            if reached || moved_up {
                self.follow_pending = false;
            }
        }
        self.refresh_anchor();

        // The first event after a prepend reflects the anchor jump itself.
        if self.anchor_adjustment_pending {
            self.anchor_adjustment_pending = false;
            return false;
        }

        if !self.should_load_more(pager) {
            return false;
        }
        self.load_more_in_flight = true;
        debug!(scroll_top = metrics.scroll_top, "requesting older messages");
        true
    }

    fn should_load_more(&self, pager: PaginationState) -> bool {
        let Some(metrics) = self.metrics else {
            return false;
        };
        metrics.scroll_top < self.config.load_more_threshold
            && pager.has_more
            && !pager.is_loading_more
            && !self.load_more_in_flight
            && !self.anchor_adjustment_pending
    }

    /// Clears the in-flight flag when a page request ends without a prepend.
    pub fn finish_load_more(&mut self) {
        self.load_more_in_flight = false;
    }

    /// Stores a measured height. Returns a compensating scroll when an item
    /// above the viewport changed size.
    pub fn record_height(&mut self, id: &str, height: f32) -> ScrollCommand {
        let delta = height - self.item_height(id);
        self.heights.insert(id.to_string(), height);
        if delta.abs() < 0.5 {
            return ScrollCommand::None;
        }

        let total = self.total_height();
        let old_bottom = self
            .ids
            .iter()
            .position(|candidate| candidate == id)
            .map(|index| self.offset_of(index + 1) - delta);
        let Some(metrics) = self.metrics.as_mut() else {
            return ScrollCommand::None;
        };
        metrics.scroll_height = total;

        if self.anchor.is_at_bottom {
            metrics.scroll_top = (total - metrics.client_height).max(0.0);
            self.follow_pending = true;
            return ScrollCommand::ToBottom(ScrollBehavior::Instant);
        }
        match old_bottom {
            Some(old_bottom) if old_bottom <= metrics.scroll_top => {
                metrics.scroll_top = (metrics.scroll_top + delta).max(0.0);
                ScrollCommand::ToOffset(metrics.scroll_top)
            }
            _ => ScrollCommand::None,
        }
    }

    /// Reconciles the list with the current message order and decides how to scroll.
    pub fn sync<I, S>(&mut self, ids: I, growth: Growth) -> ScrollCommand
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let next: Vec<String> = ids.into_iter().map(|id| id.as_ref().to_string()).collect();
        let previous = std::mem::replace(&mut self.ids, next);
        let was_at_bottom = self.anchor.is_at_bottom;

        let present: HashSet<&str> = self.ids.iter().map(String::as_str).collect();
        self.heights.retain(|id, _| present.contains(id.as_str()));

        let command = match self.classify(&previous) {
            Change::Prepended(count) => {
                self.load_more_in_flight = false;
                self.preserve_anchor_after_prepend(count)
            }
            Change::Appended if was_at_bottom => self.stick_to_bottom(ScrollBehavior::Smooth),
            Change::Same if growth == Growth::Streaming && was_at_bottom => {
                self.stick_to_bottom(ScrollBehavior::Instant)
            }
            Change::Replaced => {
                self.load_more_in_flight = false;
                self.stick_to_bottom(ScrollBehavior::Instant)
            }
            Change::Appended | Change::Same => ScrollCommand::None,
        };

        if command == ScrollCommand::None {
            let total = self.total_height();
            if let Some(metrics) = self.metrics.as_mut() {
                metrics.scroll_height = total;
            }
        }
        self.refresh_anchor();
        command
    }

    fn classify(&self, previous: &[String]) -> Change {
        match (previous.first(), self.ids.first()) {
            (None, None) => Change::Same,
            (None, Some(_)) => Change::Appended,
            (Some(_), None) => Change::Replaced,
            (Some(old_first), Some(new_first)) if old_first != new_first => {
                match self.ids.iter().position(|id| id == old_first) {
                    Some(count) => Change::Prepended(count),
                    None => Change::Replaced,
                }
            }
            _ if self.ids.len() > previous.len() && previous.last() != self.ids.last() => {
                Change::Appended
            }
            _ => Change::Same,
        }
    }

    fn preserve_anchor_after_prepend(&mut self, count: usize) -> ScrollCommand {
        let added = self.offset_of(count);
        let total = self.total_height();
        let Some(metrics) = self.metrics.as_mut() else {
            return ScrollCommand::None;
        };
        metrics.scroll_height = total;
        metrics.scroll_top += added;
        self.anchor_adjustment_pending = true;
        self.follow_pending = false;
        debug!(
            prepended = count,
            offset = metrics.scroll_top,
            anchor = ?self.anchor.first_visible_message_id,
            "keeping viewport after prepend"
        );
        ScrollCommand::ToOffset(metrics.scroll_top)
    }

    /// Scrolls to the newest message and resumes following it.
    pub fn jump_to_bottom(&mut self) -> ScrollCommand {
        self.stick_to_bottom(ScrollBehavior::Smooth)
    }

    fn stick_to_bottom(&mut self, behavior: ScrollBehavior) -> ScrollCommand {
        let total = self.total_height();
        self.anchor.is_at_bottom = true;
        let Some(metrics) = self.metrics.as_mut() else {
            return ScrollCommand::None;
        };
        metrics.scroll_height = total;
        metrics.scroll_top = (total - metrics.client_height).max(0.0);
        self.follow_pending = true;
        ScrollCommand::ToBottom(behavior)
    }

    fn refresh_anchor(&mut self) {
        let Some(metrics) = self.metrics else {
            return;
        };
        self.anchor.is_at_bottom =
            self.follow_pending || metrics.distance_from_bottom() < self.config.bottom_epsilon;

        let mut top = 0.0;
        self.anchor.first_visible_message_id = None;
        for id in &self.ids {
            let bottom = top + self.item_height(id);
            if bottom > metrics.scroll_top {
                self.anchor.first_visible_message_id = Some(id.clone());
                break;
            }
            top = bottom;
        }
    }

    /// Indices to mount this frame.
    pub fn visible_range(&self) -> Range<usize> {
        let count = self.ids.len();
        if !self.is_windowed() {
            return 0..count;
        }
        let Some(metrics) = self.metrics else {
            return count.saturating_sub(self.config.overscan * 2)..count;
        };

        let viewport_bottom = metrics.scroll_top + metrics.client_height;
        let mut first = count;
        let mut last = count;
        let mut top = 0.0;
        for (index, id) in self.ids.iter().enumerate() {
            let bottom = top + self.item_height(id);
            if first == count && bottom > metrics.scroll_top {
                first = index;
            }
            if top >= viewport_bottom {
                last = index;
                break;
            }
            top = bottom;
        }
        if first == count {
            first = count.saturating_sub(1);
        }

        let start = first.saturating_sub(self.config.overscan);
        let end = (last + self.config.overscan).min(count);
        start..end
    }

    pub fn id_at(&self, index: usize) -> Option<&str> {
        self.ids.get(index).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Same,
    Appended,
    Prepended(usize),
    Replaced,
}

#[cfg(test)]
mod tests {
    use super::{
        Growth, ListConfig, PaginationState, ScrollBehavior, ScrollCommand, ScrollMetrics,
        VirtualizedMessageList,
    };
    use proptest::prelude::*;

    fn ids(range: std::ops::Range<usize>) -> Vec<String> {
        range.map(|index| format!("m{index}")).collect()
    }

    fn mounted(count: usize, scroll_top: f32) -> VirtualizedMessageList {
        let mut list = VirtualizedMessageList::new(ListConfig::default());
        list.sync(ids(0..count), Growth::Organic);
        let metrics = ScrollMetrics {
            scroll_top,
            scroll_height: list.total_height(),
            client_height: 600.0,
        };
        list.on_scroll(metrics, PaginationState::default());
        list
    }

    fn bottom_of(list: &VirtualizedMessageList) -> f32 {
        list.total_height() - 600.0
    }

    fn no_more_pages() -> PaginationState {
        PaginationState::default()
    }

    #[test]
    fn appending_while_at_bottom_follows_new_content() {
        let mut list = mounted(20, 20.0 * 120.0 - 600.0);
        assert!(list.anchor().is_at_bottom);

        let command = list.sync(ids(0..23), Growth::Organic);
        assert_eq!(command, ScrollCommand::ToBottom(ScrollBehavior::Smooth));
        assert!(list.anchor().is_at_bottom);
        let metrics = list.metrics().expect("list is mounted");
        assert_eq!(metrics.scroll_top, bottom_of(&list));
    }

    #[test]
    fn stale_scroll_report_after_send_keeps_following() {
        let mut list = mounted(20, 20.0 * 120.0 - 600.0);
        let old_top = bottom_of(&list);

        // User and assistant messages land together; the view reports the
        // frame's viewport before the smooth scroll has moved it.
        let command = list.sync(ids(0..22), Growth::Organic);
        assert_eq!(command, ScrollCommand::ToBottom(ScrollBehavior::Smooth));
        list.on_scroll(
            ScrollMetrics {
                scroll_top: old_top,
                scroll_height: list.total_height(),
                client_height: 600.0,
            },
            no_more_pages(),
        );
        assert!(list.anchor().is_at_bottom);

        list.record_height("m21", 300.0);
        assert_eq!(
            list.sync(ids(0..22), Growth::Streaming),
            ScrollCommand::ToBottom(ScrollBehavior::Instant)
        );

        list.on_scroll(
            ScrollMetrics {
                scroll_top: bottom_of(&list),
                scroll_height: list.total_height(),
                client_height: 600.0,
            },
            no_more_pages(),
        );
        assert!(list.anchor().is_at_bottom);
    }

    #[test]
    fn scrolling_up_during_smooth_follow_stops_following() {
        let mut list = mounted(20, 20.0 * 120.0 - 600.0);
        let old_top = bottom_of(&list);
        list.sync(ids(0..22), Growth::Organic);

        let report = |scroll_top: f32, list: &VirtualizedMessageList| ScrollMetrics {
            scroll_top,
            scroll_height: list.total_height(),
            client_height: 600.0,
        };
        list.on_scroll(report(old_top, &list), no_more_pages());
        list.on_scroll(report(old_top - 400.0, &list), no_more_pages());
        assert!(!list.anchor().is_at_bottom);
        assert_eq!(list.sync(ids(0..22), Growth::Streaming), ScrollCommand::None);
    }

    #[test]
    fn jumping_to_latest_resumes_following() {
        let mut list = mounted(20, 300.0);
        assert!(!list.anchor().is_at_bottom);

        assert_eq!(list.jump_to_bottom(), ScrollCommand::ToBottom(ScrollBehavior::Smooth));
        list.on_scroll(
            ScrollMetrics {
                scroll_top: 300.0,
                scroll_height: list.total_height(),
                client_height: 600.0,
            },
            no_more_pages(),
        );
        assert!(list.anchor().is_at_bottom);
        assert_eq!(
            list.sync(ids(0..21), Growth::Organic),
            ScrollCommand::ToBottom(ScrollBehavior::Smooth)
        );
    }

    #[test]
    fn streaming_growth_scrolls_instantly() {
        let mut list = mounted(5, 0.0);
        list.record_height("m4", 900.0);
        assert_eq!(
            list.sync(ids(0..5), Growth::Streaming),
            ScrollCommand::ToBottom(ScrollBehavior::Instant)
        );
    }

    #[test]
    fn appending_while_scrolled_up_keeps_position() {
        let mut list = mounted(20, 300.0);
        assert!(!list.anchor().is_at_bottom);

        assert_eq!(list.sync(ids(0..25), Growth::Organic), ScrollCommand::None);
        assert_eq!(list.sync(ids(0..25), Growth::Streaming), ScrollCommand::None);
        let metrics = list.metrics().expect("list is mounted");
        assert_eq!(metrics.scroll_top, 300.0);
        assert!(!list.anchor().is_at_bottom);
    }

    #[test]
    fn prepend_keeps_first_visible_message_in_place() {
        let mut list = mounted(20, 250.0);
        let anchor_id = list
            .anchor()
            .first_visible_message_id
            .clone()
            .expect("an item is visible");
        assert_eq!(anchor_id, "m2");
        let before = list.offset_of(2) - 250.0;

        let command = list.sync(
            (0..10).map(|i| format!("old{i}")).chain(ids(0..20)),
            Growth::Organic,
        );
        let ScrollCommand::ToOffset(offset) = command else {
            panic!("prepend should produce an offset command, got {command:?}");
        };
        assert_eq!(offset, 250.0 + 10.0 * 120.0);
        assert_eq!(list.anchor().first_visible_message_id.as_deref(), Some("m2"));
        assert_eq!(list.offset_of(12) - offset, before);
    }

    #[test]
    fn pagination_triggers_near_top_once() {
        let mut list = mounted(10, 400.0);
        let pager = PaginationState {
            has_more: true,
            is_loading_more: false,
        };
        let near_top = ScrollMetrics {
            scroll_top: 40.0,
            scroll_height: list.total_height(),
            client_height: 600.0,
        };
        assert!(list.on_scroll(near_top, pager));
        assert!(!list.on_scroll(near_top, pager), "request already in flight");

        list.sync((0..5).map(|i| format!("old{i}")).chain(ids(0..10)), Growth::Organic);
        assert!(!list.is_loading_more());

        // The jump produced by the prepend must not trigger another page.
        let adjusted = list.metrics().expect("list is mounted");
        assert!(!list.on_scroll(
            ScrollMetrics {
                scroll_top: 20.0,
                ..adjusted
            },
            pager
        ));
        assert!(list.on_scroll(
            ScrollMetrics {
                scroll_top: 20.0,
                ..adjusted
            },
            pager
        ));
    }

    #[test]
    fn pagination_respects_collaborator_flags() {
        let mut list = mounted(10, 400.0);
        let near_top = ScrollMetrics {
            scroll_top: 10.0,
            scroll_height: list.total_height(),
            client_height: 600.0,
        };
        assert!(!list.on_scroll(near_top, no_more_pages()));
        assert!(!list.on_scroll(
            near_top,
            PaginationState {
                has_more: true,
                is_loading_more: true
            }
        ));
        list.finish_load_more();
        assert!(list.on_scroll(
            near_top,
            PaginationState {
                has_more: true,
                is_loading_more: false
            }
        ));
    }

    #[test]
    fn small_lists_render_everything() {
        let list = mounted(49, 0.0);
        assert!(!list.is_windowed());
        assert_eq!(list.visible_range(), 0..49);
    }

    #[test]
    fn large_lists_render_a_window_with_overscan() {
        let list = mounted(200, 120.0 * 100.0);
        assert!(list.is_windowed());
        // Viewport shows items 100..105; overscan adds five on each side.
        assert_eq!(list.visible_range(), 95..110);
    }

    #[test]
    fn unmounted_list_ignores_scroll_commands() {
        let mut list = VirtualizedMessageList::new(ListConfig::default());
        list.sync(ids(0..3), Growth::Organic);
        assert_eq!(list.sync(ids(0..4), Growth::Organic), ScrollCommand::None);
        assert_eq!(list.record_height("m0", 300.0), ScrollCommand::None);
        assert!(list.metrics().is_none());
        assert!(list.anchor().is_at_bottom);
    }

    #[test]
    fn measured_height_above_viewport_compensates_offset() {
        let mut list = mounted(20, 1200.0);
        assert_eq!(list.record_height("m1", 220.0), ScrollCommand::ToOffset(1300.0));
        assert_eq!(list.record_height("m15", 220.0), ScrollCommand::None);
    }

    #[test]
    fn replacing_the_collection_jumps_to_bottom() {
        let mut list = mounted(10, 0.0);
        let command = list.sync((0..4).map(|i| format!("other{i}")), Growth::Organic);
        assert_eq!(command, ScrollCommand::ToBottom(ScrollBehavior::Instant));
    }

    proptest! {
        #[test]
        fn prepend_preserves_visual_offset_of_anchor(
            count in 1usize..80,
            prepended in 1usize..40,
            scroll_fraction in 0.0f32..1.0,
        ) {
            let total = count as f32 * 120.0;
            let mut list = mounted(count, (total - 600.0).max(0.0) * scroll_fraction);
            let metrics = list.metrics().expect("list is mounted");
            let anchor_id = list.anchor().first_visible_message_id.clone();
            prop_assume!(anchor_id.is_some());
            let anchor_id = anchor_id.unwrap_or_default();
            let anchor_index: usize = anchor_id[1..].parse().unwrap_or_default();
            let before = list.offset_of(anchor_index) - metrics.scroll_top;

            let next: Vec<String> = (0..prepended)
                .map(|i| format!("old{i}"))
                .chain(ids(0..count))
                .collect();
            let command = list.sync(&next, Growth::Organic);
            let ScrollCommand::ToOffset(offset) = command else {
                return Err(TestCaseError::fail(format!("unexpected command {command:?}")));
            };
            let after = list.offset_of(anchor_index + prepended) - offset;
            prop_assert!((after - before).abs() < 0.01);
            prop_assert_eq!(list.anchor().first_visible_message_id.as_deref(), Some(anchor_id.as_str()));
        }
    }
}
