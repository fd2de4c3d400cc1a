use crate::{
    bindings::{self, keysym, Action, Bindings, MouseAction},
    client::{Client, FullscreenEdge},
    config::Config,
    geometry::{self, SnapZone},
    workspace::Workspace,
    xconnection::{ConfigureRequestData, KeyCombo, Point, StateAction, XConn, XEvent},
};

use anyhow::{Context, Result};
use xcb::Window;

/// What the manager is currently doing with the pointer / keyboard.
/// Exclusive: at most one window is the subject of a drag or cycle at any
/// instant. Drag offsets live inside the variant so they cannot outlive it.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Mode {
    Idle,
    /// Button 1 drag. `dx`/`dy` are the pointer offset from the window
    /// origin, captured at press time.
    Moving { win: Window, dx: i32, dy: i32 },
    /// Button 3 drag. `dx`/`dy` map the pointer position to the window
    /// dimensions.
    Resizing { win: Window, dx: i32, dy: i32 },
    /// Stepping through the stack with the cycle key. `marker` is the
    /// window that was focused before the most recent step.
    Cycling { marker: Window },
}

/**
 * The top level window manager state: one workspace stack per virtual
 * desktop, the index of the visible one, and the current interaction mode.
 *
 * All windowing side effects go through the [`XConn`] it borrows, so the
 * whole event pipeline can be driven in tests without an X server.
 */
pub struct WindowManager<'a, X: XConn> {
    conn: &'a X,
    config: Config,
    bindings: Bindings,
    workspaces: Vec<Workspace>,
    current: usize,
    mode: Mode,
    running: bool,
}

impl<'a, X: XConn> WindowManager<'a, X> {
    pub fn new(conn: &'a X, config: Config) -> Result<WindowManager<'a, X>> {
        conn.register_wm()
            .context("unable to take control of the root window")?;

        let bindings = Bindings::new(&config);
        let workspaces = (0..config.workspace_count).map(|_| Workspace::new()).collect();

        let wm = WindowManager {
            conn,
            config,
            bindings,
            workspaces,
            current: 0,
            mode: Mode::Idle,
            running: false,
        };

        wm.grab_keys();
        for &(mod_mask, button) in wm.bindings.buttons() {
            wm.conn.grab_button(mod_mask, button);
        }
        wm.conn.flush();

        Ok(wm)
    }

    /// Block on the X event stream until told to exit or the connection
    /// drops.
    pub fn run(&mut self) {
        self.running = true;
        while self.running && self.conn.connection_ok() {
            self.conn.flush();
            if let Some(event) = self.conn.wait_for_event() {
                debug!("got XEvent: {:?}", event);
                self.handle_event(event);
            }
        }
    }

    pub fn handle_event(&mut self, event: XEvent) {
        match event {
            XEvent::ButtonPress {
                id,
                point,
                mod_mask,
                button,
            } => self.handle_button_press(id, point, mod_mask, button),
            XEvent::ButtonRelease => self.handle_button_release(),
            XEvent::MotionNotify => self.handle_motion(),
            XEvent::EnterNotify { id } => self.handle_enter_notify(id),
            XEvent::KeyPress { key } => self.handle_key_press(key),
            XEvent::KeyRelease { key } => self.handle_key_release(key),
            XEvent::MapRequest { id } => self.handle_map_request(id),
            XEvent::UnmapNotify { id } => self.handle_unmap_notify(id),
            XEvent::DestroyNotify { id } => self.handle_destroy_notify(id),
            XEvent::FullscreenRequest { id, action } => {
                self.handle_fullscreen_request(id, action)
            }
            XEvent::ConfigureRequest(data) => self.handle_configure_request(data),
            XEvent::MappingNotify => self.handle_mapping_notify(),
        }
    }

    fn workspace(&self) -> &Workspace {
        &self.workspaces[self.current]
    }

    fn workspace_mut(&mut self) -> &mut Workspace {
        &mut self.workspaces[self.current]
    }

    /// Current workspace first: it is the hot path for event handling.
    fn find_anywhere(&self, win: Window) -> Option<usize> {
        if self.workspace().contains(win) {
            return Some(self.current);
        }
        self.workspaces.iter().position(|ws| ws.contains(win))
    }

    fn grab_keys(&self) {
        for key in self.bindings.keys() {
            self.conn.grab_key(key.mod_mask, key.keysym);
        }
    }

    /// Move a window to the top of the stack, restacking server side only
    /// when it was not already topmost.
    fn raise(&mut self, win: Window) {
        if self.workspace_mut().raise_to_top(win) {
            self.conn.configure_window(win, None, None, true);
        }
    }

    fn focus(&mut self, win: Window) {
        if self.workspace().focused() == Some(win) {
            return;
        }
        if let Some(prev) = self.workspace().focused() {
            self.conn
                .set_border_color(prev, self.config.unfocused_border_color);
        }
        self.conn
            .set_border_color(win, self.config.focused_border_color);
        self.conn.focus_window(win);
        self.workspace_mut().set_focused(Some(win));
    }

    fn warp_to_center(&self, win: Window) {
        if let Ok(geom) = self.conn.query_geometry(win) {
            let (x, y) = geometry::center_offset(&self.config, &geom);
            self.conn.warp_pointer(win, x, y);
        }
    }

    fn handle_map_request(&mut self, id: Window) {
        if self.find_anywhere(id).is_some() {
            return;
        }
        if self.conn.window_is_dock_like(id) {
            self.conn.map_window(id);
            return;
        }

        // Window gone between the request and the query: nothing to manage
        let geom = match self.conn.query_geometry(id) {
            Ok(g) => g,
            Err(_) => return,
        };
        let pointer = self.conn.query_pointer().unwrap_or_else(|_| Point::new(0, 0));
        let rect = geometry::initial_placement(
            &self.config,
            self.conn.screen_size(),
            pointer,
            (geom.width(), geom.height()),
        );

        self.conn
            .configure_window(id, Some(rect), Some(self.config.border_px), false);
        self.conn
            .set_border_color(id, self.config.unfocused_border_color);
        self.conn.normal_events(id);
        self.conn.map_window(id);

        self.workspace_mut().insert(Client::new(id));
        if self.mode == Mode::Idle {
            self.focus(id);
        }
    }

    fn handle_unmap_notify(&mut self, id: Window) {
        let ignore = match self.workspace_mut().client_mut(id) {
            Some(client) => client.consume_ignore_unmap(),
            None => return,
        };
        if !ignore {
            self.forget_client(self.current, id);
        }
    }

    fn handle_destroy_notify(&mut self, id: Window) {
        if let Some(ws) = self.find_anywhere(id) {
            self.forget_client(ws, id);
        }
    }

    /// Drop a window from the registry and repair whatever pointed at it:
    /// an in-flight drag must release its grab or all pointer input is
    /// lost, an in-flight cycle is ended, and focus falls back to the new
    /// stack head.
    fn forget_client(&mut self, ws: usize, win: Window) {
        match self.mode {
            Mode::Moving { win: w, .. } | Mode::Resizing { win: w, .. } if w == win => {
                self.conn.ungrab_pointer();
                self.mode = Mode::Idle;
            }
            _ => {}
        }

        let was_focused = self.workspaces[ws].focused() == Some(win);
        self.workspaces[ws].excise(win);

        if matches!(self.mode, Mode::Cycling { .. }) && ws == self.current {
            self.stop_cycle();
        }

        if ws != self.current || !was_focused {
            return;
        }
        match self.workspace().top() {
            Some(head) => self.focus(head),
            None => {
                self.workspace_mut().set_focused(None);
                self.conn.focus_nothing();
            }
        }
    }

    fn handle_button_press(&mut self, id: Window, point: Point, mod_mask: u16, button: u8) {
        let action = match self.bindings.button_action(mod_mask, button) {
            Some(a) => a,
            None => return,
        };
        if !self.workspace().contains(id) {
            return;
        }
        if matches!(self.mode, Mode::Cycling { .. }) {
            self.stop_cycle();
        }

        self.raise(id);
        self.focus(id);

        // Fullscreen windows are click-to-raise only
        let (fullscreen, snap) = match self.workspace().client(id) {
            Some(c) => (c.is_fullscreen(), c.snapped_rect()),
            None => return,
        };
        if fullscreen {
            return;
        }
        let geom = match self.conn.query_geometry(id) {
            Ok(g) => g,
            Err(_) => return,
        };

        self.mode = match action {
            MouseAction::Move => {
                // For a snapped window, scale the grab offset into the
                // pre-snap rectangle so the drag stays proportional once
                // the window pops back to its saved size.
                let (dx, dy) = match snap {
                    Some(saved) => (
                        saved.width() as i32 * (point.x - geom.x()) / geom.width() as i32,
                        saved.height() as i32 * (point.y - geom.y()) / geom.height() as i32,
                    ),
                    None => (point.x - geom.x(), point.y - geom.y()),
                };
                Mode::Moving { win: id, dx, dy }
            }
            MouseAction::Resize => {
                if let Some(c) = self.workspace_mut().client_mut(id) {
                    c.clear_snap();
                }
                Mode::Resizing {
                    win: id,
                    dx: geom.width() as i32 - point.x,
                    dy: geom.height() as i32 - point.y,
                }
            }
        };
        self.conn.grab_pointer();
    }

    fn handle_button_release(&mut self) {
        if matches!(self.mode, Mode::Moving { .. } | Mode::Resizing { .. }) {
            self.conn.ungrab_pointer();
            self.mode = Mode::Idle;
        }
    }

    /// Motion events are delivered compressed (motion hint); the actual
    /// pointer position is re-queried here.
    fn handle_motion(&mut self) {
        let p = match self.conn.query_pointer() {
            Ok(p) => p,
            Err(_) => return,
        };

        match self.mode {
            Mode::Moving { win, dx, dy } => {
                let zone = geometry::zone_at_pointer(&self.config, self.conn.screen_size(), p);
                if let Some(zone) = zone {
                    self.apply_snap(win, zone);
                } else {
                    if let Some(saved) =
                        self.workspace_mut().client_mut(win).and_then(|c| c.take_snap_rect())
                    {
                        self.conn.configure_window(win, Some(saved), None, false);
                    }
                    self.conn.position_window(win, p.x - dx, p.y - dy);
                }
            }
            Mode::Resizing { win, dx, dy } => {
                let w = (p.x + dx).max(1) as u32;
                let h = (p.y + dy).max(1) as u32;
                self.conn.resize_window(win, w, h);
            }
            _ => {}
        }
    }

    /// Focus follows the pointer: entering a window on the current
    /// workspace focuses it. Windows parked on other workspaces never
    /// generate crossings we care about.
    fn handle_enter_notify(&mut self, id: Window) {
        if self.workspace().contains(id) {
            self.focus(id);
        }
    }

    fn handle_key_press(&mut self, key: KeyCombo) {
        if key.keysym != keysym::XK_TAB && matches!(self.mode, Mode::Cycling { .. }) {
            self.stop_cycle();
        }

        let action = match self.bindings.key_action(&key) {
            Some(a) => a,
            None => return,
        };
        match action {
            Action::Exec(cmd) => bindings::spawn(&cmd),
            Action::Close => self.close_focused(),
            Action::Cycle => self.cycle(),
            Action::Snap(zone) => {
                if let Some(win) = self.workspace().focused() {
                    self.apply_snap(win, zone);
                }
            }
            Action::ToggleFullscreen => self.toggle_fullscreen(),
            Action::SwitchWorkspace(ws) => self.switch_workspace(ws),
            Action::SendToWorkspace(ws) => self.send_to_workspace(ws),
            Action::Exit => self.exit(),
        }
    }

    fn handle_key_release(&mut self, key: KeyCombo) {
        if key.keysym == keysym::XK_SUPER_L && matches!(self.mode, Mode::Cycling { .. }) {
            self.stop_cycle();
        }
    }

    /// Snap a window to one of the eight zones. Saves the current geometry
    /// the first time so leaving the snap can restore it; re-snapping an
    /// already snapped window keeps the original saved rectangle.
    fn apply_snap(&mut self, win: Window, zone: SnapZone) {
        let snapped = match self.workspace().client(win) {
            Some(c) if c.is_fullscreen() => return,
            Some(c) => c.is_snapped(),
            None => return,
        };
        if !snapped {
            let geom = match self.conn.query_geometry(win) {
                Ok(g) => g,
                Err(_) => return,
            };
            if let Some(c) = self.workspace_mut().client_mut(win) {
                c.save_snap_rect(geom);
            }
        }

        let rect = geometry::snap_rect(zone, &self.config, self.conn.screen_size());
        self.conn.configure_window(win, Some(rect), None, false);

        // Mid-drag the pointer stays where it is; a keyboard snap follows
        // the window.
        if matches!(self.mode, Mode::Moving { .. }) {
            return;
        }
        let (x, y) = geometry::center_offset(&self.config, &rect);
        self.conn.warp_pointer(win, x, y);
        self.raise(win);
    }

    fn toggle_fullscreen(&mut self) {
        let win = match self.workspace().focused() {
            Some(w) => w,
            None => return,
        };
        let edge = match self.workspace_mut().client_mut(win) {
            Some(c) => c.toggle_internal_fullscreen(),
            None => return,
        };
        self.apply_fullscreen_edge(self.current, win, edge);
    }

    fn handle_fullscreen_request(&mut self, id: Window, action: StateAction) {
        let ws = match self.find_anywhere(id) {
            Some(ws) => ws,
            None => return,
        };
        let edge = match self.workspaces[ws].client_mut(id) {
            Some(c) => c.external_fullscreen_request(action),
            None => return,
        };
        self.apply_fullscreen_edge(ws, id, edge);
    }

    /// Geometry is saved when the combined fullscreen state first turns on
    /// and restored when it fully turns off; flipping one bit while the
    /// other stays set changes nothing visually.
    fn apply_fullscreen_edge(&mut self, ws: usize, win: Window, edge: FullscreenEdge) {
        match edge {
            FullscreenEdge::Entered => {
                let geom = match self.conn.query_geometry(win) {
                    Ok(g) => g,
                    Err(_) => return,
                };
                if ws == self.current {
                    self.raise(win);
                }
                if let Some(c) = self.workspaces[ws].client_mut(win) {
                    c.save_fullscreen_rect(geom);
                }
                let rect = geometry::fullscreen_rect(&self.config, self.conn.screen_size());
                self.conn.configure_window(win, Some(rect), None, false);
            }
            FullscreenEdge::Exited => {
                if let Some(saved) =
                    self.workspaces[ws].client_mut(win).and_then(|c| c.take_fullscreen_rect())
                {
                    self.conn.configure_window(win, Some(saved), None, false);
                }
            }
            FullscreenEdge::Unchanged => {}
        }
    }

    /**
     * Step to the next window down the stack, wrapping to the head past
     * the bottom. Before each step the raises made by the previous step
     * are unwound (`rewind`), so the stack always steps from its original
     * order and windows outside the marker-to-focus path are never
     * reordered.
     *
     * While cycling, workspace windows report key releases so that
     * releasing the modifier can end the cycle.
     */
    fn cycle(&mut self) {
        if self.workspace().len() < 2 {
            return;
        }

        let marker = match self.mode {
            Mode::Cycling { marker } => marker,
            _ => {
                let focused = match self.workspace().focused() {
                    Some(w) => w,
                    None => return,
                };
                for win in self.workspace().windows() {
                    self.conn.release_events_only(win);
                }
                focused
            }
        };
        self.rewind(marker);

        let focused = match self.workspace().focused() {
            Some(w) => w,
            None => return,
        };
        let next = self
            .workspace()
            .position(focused)
            .and_then(|pos| self.workspace().window_at(pos + 1));
        match next {
            Some(target) => {
                self.warp_to_center(target);
                self.raise(target);
                self.focus(target);
            }
            None => {
                // Focused window is at the bottom: wrap to the head
                if let Some(target) = self.workspace().top() {
                    self.warp_to_center(target);
                    self.focus(target);
                }
            }
        }
        self.mode = Mode::Cycling { marker: focused };
    }

    /// Walk from the marker back up to the focused window, raising each
    /// window passed over. This undoes the raise of the previous cycle
    /// step, restoring the stack order from before it.
    fn rewind(&mut self, marker: Window) {
        let focused = match self.workspace().focused() {
            Some(w) => w,
            None => return,
        };
        let mut cur = marker;
        while cur != focused {
            let above = match self.workspace().position(cur) {
                Some(0) | None => return,
                Some(pos) => self.workspace().window_at(pos - 1),
            };
            self.raise(cur);
            cur = match above {
                Some(w) => w,
                None => return,
            };
        }
    }

    fn stop_cycle(&mut self) {
        self.mode = Mode::Idle;
        for win in self.workspace().windows() {
            self.conn.normal_events(win);
        }
    }

    fn switch_workspace(&mut self, ws: usize) {
        if ws == self.current || ws >= self.workspaces.len() {
            return;
        }

        for win in self.workspaces[ws].windows() {
            self.conn.map_window(win);
        }
        for win in self.workspaces[self.current].windows() {
            if let Some(c) = self.workspaces[self.current].client_mut(win) {
                c.mark_ignore_unmap();
            }
            self.conn.unmap_window(win);
        }

        self.current = ws;
        match self.workspace().focused() {
            Some(win) => self.conn.focus_window(win),
            None => self.conn.focus_nothing(),
        }
    }

    /// Move the focused window to another workspace. The source workspace
    /// focuses its new stack head; the target adopts the window as focused
    /// only when nothing was focused there.
    fn send_to_workspace(&mut self, target: usize) {
        if target == self.current || target >= self.workspaces.len() {
            return;
        }
        let win = match self.workspace().focused() {
            Some(w) => w,
            None => return,
        };

        // Keep it above whatever it lands on when its new workspace is
        // next shown
        self.conn.configure_window(win, None, None, true);

        let mut client = match self.workspace_mut().excise(win) {
            Some(c) => c,
            None => return,
        };
        client.mark_ignore_unmap();
        self.conn.unmap_window(win);
        self.workspaces[target].insert(client);

        if self.workspaces[target].focused().is_none() {
            self.workspaces[target].set_focused(Some(win));
        } else {
            self.conn
                .set_border_color(win, self.config.unfocused_border_color);
        }

        match self.workspace().top() {
            Some(head) => self.focus(head),
            None => {
                self.workspace_mut().set_focused(None);
                self.conn.focus_nothing();
            }
        }
    }

    fn close_focused(&mut self) {
        if let Some(win) = self.workspace().focused() {
            self.conn.close_window(win);
        }
    }

    /// Unmanaged windows get their request verbatim, stacking included.
    /// Managed windows get geometry only, and fullscreen ones nothing.
    fn handle_configure_request(&mut self, data: ConfigureRequestData) {
        match self.find_anywhere(data.id) {
            None => self.conn.apply_configure_request(&data, true),
            Some(ws) => {
                let fullscreen = self.workspaces[ws]
                    .client(data.id)
                    .map_or(false, |c| c.is_fullscreen());
                if !fullscreen {
                    self.conn.apply_configure_request(&data, false);
                }
            }
        }
    }

    fn handle_mapping_notify(&mut self) {
        self.conn.ungrab_keys();
        self.grab_keys();
    }

    fn exit(&mut self) {
        info!("shutting down");
        for ws in &self.workspaces {
            for win in ws.windows() {
                self.conn.close_window(win);
            }
        }
        self.conn.cleanup();
        self.running = false;
    }
}
