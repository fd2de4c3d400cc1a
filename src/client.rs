use xcb::Window;

use crate::xconnection::{Rectangle, StateAction};

/// Result of flipping one of the two fullscreen bits: whether the combined
/// fullscreen state changed. Geometry is saved on `Entered` and restored on
/// `Exited`; flipping one bit while the other stays set is `Unchanged` and
/// has no visual effect.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum FullscreenEdge {
    Entered,
    Exited,
    Unchanged,
}

/**
 * State for a single managed window.
 *
 * Three independent axes: snap (with the rectangle to restore to when the
 * snap is released), fullscreen (internal = our keybind, external = the
 * window's own _NET_WM_STATE request, sharing one saved rectangle and one
 * visual effect), and a single-shot ignore-next-unmap intent set whenever
 * the manager itself unmaps the window.
 */
#[derive(Debug, PartialEq, Clone)]
pub struct Client {
    id: Window,
    snap_rect: Option<Rectangle>,
    full_rect: Option<Rectangle>,
    internal_full: bool,
    external_full: bool,
    ignore_next_unmap: bool,
}

impl Client {
    pub fn new(id: Window) -> Client {
        Client {
            id,
            snap_rect: None,
            full_rect: None,
            internal_full: false,
            external_full: false,
            ignore_next_unmap: false,
        }
    }

    /// The X window ID of this client
    pub fn id(&self) -> Window {
        self.id
    }

    pub fn is_snapped(&self) -> bool {
        self.snap_rect.is_some()
    }

    pub fn snapped_rect(&self) -> Option<Rectangle> {
        self.snap_rect
    }

    /// Record the pre-snap geometry. Only the first save while snapped
    /// sticks: re-snapping an already snapped window keeps the original
    /// restore target.
    pub fn save_snap_rect(&mut self, rect: Rectangle) {
        if self.snap_rect.is_none() {
            self.snap_rect = Some(rect);
        }
    }

    /// Leave the snapped state, yielding the rectangle to restore to.
    pub fn take_snap_rect(&mut self) -> Option<Rectangle> {
        self.snap_rect.take()
    }

    /// Drop the snap without restoring (resize detaches from snap).
    pub fn clear_snap(&mut self) {
        self.snap_rect = None;
    }

    pub fn is_fullscreen(&self) -> bool {
        self.internal_full || self.external_full
    }

    /// Flip the keybind-driven fullscreen bit.
    pub fn toggle_internal_fullscreen(&mut self) -> FullscreenEdge {
        self.set_fullscreen_bits(!self.internal_full, self.external_full)
    }

    /// Apply a _NET_WM_STATE fullscreen request from the window itself.
    /// `Add` on an already fullscreen window (and `Remove` on a normal one)
    /// is a no-op.
    pub fn external_fullscreen_request(&mut self, action: StateAction) -> FullscreenEdge {
        let target = match action {
            StateAction::Add => true,
            StateAction::Remove => false,
            StateAction::Toggle => !self.external_full,
        };
        if target == self.external_full {
            return FullscreenEdge::Unchanged;
        }
        self.set_fullscreen_bits(self.internal_full, target)
    }

    fn set_fullscreen_bits(&mut self, internal: bool, external: bool) -> FullscreenEdge {
        let was = self.is_fullscreen();
        self.internal_full = internal;
        self.external_full = external;
        match (was, self.is_fullscreen()) {
            (false, true) => FullscreenEdge::Entered,
            (true, false) => FullscreenEdge::Exited,
            _ => FullscreenEdge::Unchanged,
        }
    }

    /// Record the pre-fullscreen geometry. Must not be overwritten while
    /// any fullscreen bit remains set, or the restore target is lost when
    /// the two bits toggle independently.
    pub fn save_fullscreen_rect(&mut self, rect: Rectangle) {
        if self.full_rect.is_none() {
            self.full_rect = Some(rect);
        }
    }

    pub fn take_fullscreen_rect(&mut self) -> Option<Rectangle> {
        self.full_rect.take()
    }

    /// Mark that the next unmap notification for this window was caused by
    /// the manager itself and must not unmanage the window.
    pub fn mark_ignore_unmap(&mut self) {
        self.ignore_next_unmap = true;
    }

    /// Single-shot: true exactly once after `mark_ignore_unmap`.
    pub fn consume_ignore_unmap(&mut self) -> bool {
        let was = self.ignore_next_unmap;
        self.ignore_next_unmap = false;
        was
    }
}
