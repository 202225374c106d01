use crate::client::models::timeline::Timeline;
use crate::common::models::{HistoryPage, Message, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewPhase {
    Idle,
    LoadingInitial,
    Ready,
}

/// Scroll geometry of the message pane, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ScrollAnchor {
    height_before: f64,
    top_before: f64,
}

/// Request tickets; a response whose ticket is outdated is ignored.
pub type ViewTicket = u64;

/// The open conversation: its timeline, pagination cursor and scroll state.
///
/// Heights are derived from a fixed row height, which is what the terminal
/// client renders.
#[derive(Debug)]
pub struct ChatView {
    partner: Option<UserId>,
    phase: ViewPhase,
    loading_older: bool,
    next_page: u32,
    reached_start: bool,
    scroll_to_bottom: bool,
    ticket: ViewTicket,
    timeline: Timeline,
    // push arrivati mentre la prima pagina è in caricamento
    early: Vec<Message>,
    viewport: Viewport,
    anchor: Option<ScrollAnchor>,
    row_height: f64,
}

impl ChatView {
    pub fn new(row_height: f64, client_height: f64) -> Self {
        Self {
            partner: None,
            phase: ViewPhase::Idle,
            loading_older: false,
            next_page: 0,
            reached_start: false,
            scroll_to_bottom: false,
            ticket: 0,
            timeline: Timeline::new(),
            early: Vec::new(),
            viewport: Viewport { scroll_top: 0.0, scroll_height: 0.0, client_height },
            anchor: None,
            row_height,
        }
    }

    pub fn partner(&self) -> Option<UserId> {
        self.partner
    }

    pub fn phase(&self) -> ViewPhase {
        self.phase
    }

    pub fn is_loading_older(&self) -> bool {
        self.loading_older
    }

    pub fn reached_start(&self) -> bool {
        self.reached_start
    }

    pub fn next_page(&self) -> u32 {
        self.next_page
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn timeline_mut(&mut self) -> &mut Timeline {
        &mut self.timeline
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn scroll_to(&mut self, top: f64) {
        let max = (self.viewport.scroll_height - self.viewport.client_height).max(0.0);
        self.viewport.scroll_top = top.clamp(0.0, max);
    }

    fn relayout(&mut self) {
        self.viewport.scroll_height = self.timeline.len() as f64 * self.row_height;
    }

    /// Called after any change to the timeline outside pagination.
    pub fn content_changed(&mut self) {
        self.relayout();
    }

    /// idle/ready -> loadingInitial for `partner`.
    pub fn open(&mut self, partner: UserId) -> ViewTicket {
        self.ticket += 1;
        self.partner = Some(partner);
        self.phase = ViewPhase::LoadingInitial;
        self.loading_older = false;
        self.next_page = 0;
        self.reached_start = false;
        self.scroll_to_bottom = false;
        self.anchor = None;
        self.timeline.clear();
        self.early.clear();
        self.viewport.scroll_top = 0.0;
        self.relayout();
        self.ticket
    }

    pub fn close(&mut self) {
        self.ticket += 1;
        self.partner = None;
        self.phase = ViewPhase::Idle;
        self.loading_older = false;
        self.anchor = None;
        self.timeline.clear();
        self.early.clear();
        self.relayout();
    }

    /// A message of the open conversation arrived on the push channel.
    /// Before page 0 lands it is held back and merged into that page.
    pub fn push_live(&mut self, message: Message) -> bool {
        match self.phase {
            ViewPhase::Ready => {
                let added = self.timeline.append_pushed(message);
                if added {
                    self.relayout();
                }
                added
            }
            ViewPhase::LoadingInitial => {
                if self.early.iter().any(|m| m.id == message.id) {
                    return false;
                }
                self.early.push(message);
                true
            }
            ViewPhase::Idle => false,
        }
    }

    /// loadingInitial -> ready with page 0. Schedules one scroll to the newest message.
    pub fn apply_initial(&mut self, ticket: ViewTicket, page: HistoryPage) -> bool {
        if ticket != self.ticket || self.phase != ViewPhase::LoadingInitial {
            return false;
        }
        self.timeline.replace_with_page(page.messages);
        let early = std::mem::take(&mut self.early);
        self.timeline.merge_tail(early);
        self.reached_start = page.reached_start;
        self.next_page = 1;
        self.phase = ViewPhase::Ready;
        self.scroll_to_bottom = true;
        self.relayout();
        true
    }

    /// The initial load failed: back to idle, nothing to show.
    pub fn fail_initial(&mut self, ticket: ViewTicket) {
        if ticket == self.ticket && self.phase == ViewPhase::LoadingInitial {
            self.phase = ViewPhase::Idle;
        }
    }

    /// One-shot: true exactly once after the initial page, and then the
    /// viewport sits at the bottom.
    pub fn take_scroll_to_bottom(&mut self) -> bool {
        if !self.scroll_to_bottom {
            return false;
        }
        self.scroll_to_bottom = false;
        self.viewport.scroll_top = (self.viewport.scroll_height - self.viewport.client_height).max(0.0);
        true
    }

    pub fn can_load_older(&self) -> bool {
        self.phase == ViewPhase::Ready
            && !self.loading_older
            && !self.reached_start
            && self.viewport.scroll_top == 0.0
    }

    /// ready --scrollToTop--> loadingOlderPage. Returns the page to fetch.
    pub fn begin_load_older(&mut self) -> Option<(ViewTicket, u32)> {
        if !self.can_load_older() {
            return None;
        }
        self.loading_older = true;
        self.anchor = Some(ScrollAnchor {
            height_before: self.viewport.scroll_height,
            top_before: self.viewport.scroll_top,
        });
        Some((self.ticket, self.next_page))
    }

    /// Prepend the older page and shift the scroll offset by the added height,
    /// so the message on screen stays put.
    pub fn apply_older(&mut self, ticket: ViewTicket, page: HistoryPage) -> bool {
        if ticket != self.ticket || !self.loading_older {
            return false;
        }
        self.timeline.prepend_page(page.messages);
        self.reached_start = page.reached_start;
        self.next_page += 1;
        self.loading_older = false;
        self.relayout();
        if let Some(anchor) = self.anchor.take() {
            let delta = self.viewport.scroll_height - anchor.height_before;
            self.viewport.scroll_top = anchor.top_before + delta;
        }
        true
    }

    pub fn fail_older(&mut self, ticket: ViewTicket) {
        if ticket == self.ticket {
            self.loading_older = false;
            self.anchor = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::models::{Message, Timestamp};

    fn page(range: std::ops::Range<i64>, reached_start: bool) -> HistoryPage {
        HistoryPage {
            messages: range
                .map(|id| Message {
                    id,
                    sender_id: 1,
                    receiver_id: 2,
                    content: String::new(),
                    timestamp: Timestamp::from_unix(id),
                    read: true,
                })
                .collect(),
            reached_start,
        }
    }

    #[test]
    fn push_during_initial_load_is_merged_into_page_zero() {
        let mut view = ChatView::new(24.0, 240.0);
        let ticket = view.open(2);
        // 41 arriva prima della pagina, 39 è già nella pagina
        assert!(view.push_live(page(41..42, false).messages.remove(0)));
        assert!(view.push_live(page(39..40, false).messages.remove(0)));
        assert!(!view.push_live(page(41..42, false).messages.remove(0)));

        assert!(view.apply_initial(ticket, page(30..40, false)));
        let ids: Vec<i64> = view.timeline().confirmed().map(|m| m.id).collect();
        assert_eq!(ids, (30..40).chain(41..42).collect::<Vec<_>>());
        assert_eq!(view.viewport().scroll_height, 11.0 * 24.0);

        view.close();
        assert!(!view.push_live(page(50..51, false).messages.remove(0)));
    }

    #[test]
    fn initial_load_scrolls_to_bottom_exactly_once() {
        let mut view = ChatView::new(24.0, 240.0);
        let ticket = view.open(2);
        assert_eq!(view.phase(), ViewPhase::LoadingInitial);
        assert!(view.apply_initial(ticket, page(20..40, false)));
        assert_eq!(view.phase(), ViewPhase::Ready);
        assert!(view.take_scroll_to_bottom());
        assert_eq!(view.viewport().scroll_top, 480.0 - 240.0);
        assert!(!view.take_scroll_to_bottom());
    }

    #[test]
    fn older_page_preserves_visual_position() {
        let mut view = ChatView::new(24.0, 240.0);
        let ticket = view.open(2);
        view.apply_initial(ticket, page(20..40, false));
        view.take_scroll_to_bottom();
        assert!(view.begin_load_older().is_none(), "not at the top yet");

        view.scroll_to(0.0);
        let (t, page_index) = view.begin_load_older().unwrap();
        assert_eq!(page_index, 1);
        assert!(view.begin_load_older().is_none(), "already loading");

        let height_before = view.viewport().scroll_height;
        assert!(view.apply_older(t, page(0..20, true)));
        let vp = view.viewport();
        assert_eq!(view.timeline().len(), 40);
        assert_eq!(vp.scroll_top, vp.scroll_height - height_before);
        assert_eq!(vp.scroll_top, 20.0 * 24.0);

        view.scroll_to(0.0);
        assert!(view.begin_load_older().is_none(), "start reached");
    }

    #[test]
    fn responses_for_a_previous_conversation_are_ignored() {
        let mut view = ChatView::new(24.0, 240.0);
        let stale = view.open(2);
        let _fresh = view.open(3);
        assert!(!view.apply_initial(stale, page(0..5, true)));
        assert_eq!(view.phase(), ViewPhase::LoadingInitial);
        assert_eq!(view.partner(), Some(3));
    }

    #[test]
    fn older_pages_only_from_ready() {
        let mut view = ChatView::new(24.0, 240.0);
        view.open(2);
        assert!(view.begin_load_older().is_none());
        view.close();
        assert_eq!(view.phase(), ViewPhase::Idle);
        assert!(view.begin_load_older().is_none());
    }
}
