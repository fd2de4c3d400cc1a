use anyhow::{anyhow, Context, Result};

use xcb::{Atom, Window};
use xcb_util::{ewmh, icccm, keysyms};

// Mask out the most significant bit, which indicates whether the event came
// from a SendEvent request. We treat both sources the same.
const XCB_RESPONSE_TYPE_MASK: u8 = 0x7F;
const GRAB_MODE_ASYNC: u8 = xcb::GRAB_MODE_ASYNC as u8;
const INPUT_FOCUS_POINTER_ROOT: u8 = xcb::INPUT_FOCUS_POINTER_ROOT as u8;

const ROOT_EVENT_MASK: &[(u32, u32)] = &[(
    xcb::CW_EVENT_MASK,
    xcb::EVENT_MASK_SUBSTRUCTURE_REDIRECT | xcb::EVENT_MASK_SUBSTRUCTURE_NOTIFY,
)];

// Managed windows normally only report pointer entry; while cycle mode is
// active they additionally report key releases so that letting go of the
// modifier can end the cycle.
const NORMAL_WINDOW_EVENTS: u32 = xcb::EVENT_MASK_ENTER_WINDOW;
const RELEASE_WINDOW_EVENTS: u32 = xcb::EVENT_MASK_ENTER_WINDOW | xcb::EVENT_MASK_KEY_RELEASE;

const POINTER_GRAB_MASK: u16 = (xcb::EVENT_MASK_BUTTON_RELEASE
    | xcb::EVENT_MASK_BUTTON_MOTION
    | xcb::EVENT_MASK_POINTER_MOTION_HINT) as u16;

const BUTTON_GRAB_MASK: u16 =
    (xcb::EVENT_MASK_BUTTON_PRESS | xcb::EVENT_MASK_BUTTON_RELEASE) as u16;

const CONFIG_WINDOW_X: u16 = xcb::CONFIG_WINDOW_X as u16;
const CONFIG_WINDOW_Y: u16 = xcb::CONFIG_WINDOW_Y as u16;
const CONFIG_WINDOW_WIDTH: u16 = xcb::CONFIG_WINDOW_WIDTH as u16;
const CONFIG_WINDOW_HEIGHT: u16 = xcb::CONFIG_WINDOW_HEIGHT as u16;
const CONFIG_WINDOW_BORDER_WIDTH: u16 = xcb::CONFIG_WINDOW_BORDER_WIDTH as u16;
const CONFIG_WINDOW_SIBLING: u16 = xcb::CONFIG_WINDOW_SIBLING as u16;
const CONFIG_WINDOW_STACK_MODE: u16 = xcb::CONFIG_WINDOW_STACK_MODE as u16;
const STACK_MODE_ABOVE: u32 = xcb::STACK_MODE_ABOVE as u32;

// _NET_WM_STATE client message action field values, per the EWMH spec.
const NET_WM_STATE_REMOVE: u32 = 0;
const NET_WM_STATE_ADD: u32 = 1;
const NET_WM_STATE_TOGGLE: u32 = 2;

macro_rules! atoms {
    ( $( $name:ident ),+ ) => {
        #[allow(non_snake_case)]
        pub struct InternedAtoms {
            $(
                pub $name: xcb::Atom
            ),*
        }

        impl InternedAtoms {
            pub fn new(conn: &xcb::Connection) -> Result<InternedAtoms> {
                Ok(InternedAtoms {
                    $(
                        $name: xcb::intern_atom(conn, false, stringify!($name)).get_reply()?.atom()
                    ),*
                })
            }
        }
    };
    // Allow trailing comma:
    ( $( $name:ident ),+ , ) => (atoms!($( $name ),+);)
}

// Intern atoms that are not built-in in icccm or ewmh
atoms!(WM_DELETE_WINDOW);

/// An X keysym along with a modifier mask, as delivered by key events and as
/// used in the binding tables.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct KeyCombo {
    /// Modifier key bit mask
    pub mod_mask: u16,
    /// X keysym
    pub keysym: u32,
}

/// An x,y coordinate pair relative to the root window
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Point {
        Point { x, y }
    }
}

/// An X window / screen position: top left corner + extent
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Rectangle {
    x: i32,
    y: i32,
    w: u32,
    h: u32,
}

impl Rectangle {
    /// Create a new Rectangle.
    pub fn new(x: i32, y: i32, w: u32, h: u32) -> Rectangle {
        Rectangle { x, y, w, h }
    }

    /// Destructure this Rectangle into its component values (x, y, w, h).
    pub fn values(&self) -> (i32, i32, u32, u32) {
        (self.x, self.y, self.w, self.h)
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn y(&self) -> i32 {
        self.y
    }

    pub fn width(&self) -> u32 {
        self.w
    }

    pub fn height(&self) -> u32 {
        self.h
    }
}

/// The add/remove/toggle field of a _NET_WM_STATE client message.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum StateAction {
    Add,
    Remove,
    Toggle,
}

/// A ConfigureRequest carrying only the fields the client actually set.
#[derive(Debug, Clone, Default)]
pub struct ConfigureRequestData {
    pub id: Window,
    pub x: Option<i32>,
    pub y: Option<i32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub sibling: Option<Window>,
    pub stack_mode: Option<u32>,
}

/**
 * Wrapper around the low level XCB event types that require casting to work
 * with. Not all event fields are extracted so check the XCB documentation
 * and update accordingly if you need access to something that isn't
 * currently passed through to the WindowManager event loop.
 *
 * Pointer coordinates are always root-relative; mouse bindings are grabbed
 * on the root window so `event_x`/`root_x` coincide.
 */
#[derive(Debug, Clone)]
pub enum XEvent {
    /// A mouse button was pressed; `id` is the subwindow under the pointer
    ButtonPress {
        id: Window,
        point: Point,
        mod_mask: u16,
        button: u8,
    },

    /// A mouse button was released, ending any move/resize drag
    ButtonRelease,

    /// The pointer moved while a grab was active. The current position is
    /// re-queried by the handler (POINTER_MOTION_HINT compression).
    MotionNotify,

    /// The pointer entered a window (focus follows the pointer)
    EnterNotify { id: Window },

    /// A grabbed key was pressed
    KeyPress { key: KeyCombo },

    /// A key was released on a window in release-events mode
    KeyRelease { key: KeyCombo },

    /// A window asked to be mapped
    MapRequest { id: Window },

    /// A window was unmapped
    UnmapNotify { id: Window },

    /// A window was destroyed
    DestroyNotify { id: Window },

    /// A _NET_WM_STATE fullscreen change was requested by the client itself
    FullscreenRequest { id: Window, action: StateAction },

    /// A window asked to be moved/resized/restacked
    ConfigureRequest(ConfigureRequestData),

    /// The keyboard mapping changed and bound keys must be re-grabbed
    MappingNotify,
}

/**
 * The display server capability consumed by the WindowManager.
 *
 * One real implementation talks to X via xcb; the mock implementation used
 * by the test suite records outbound commands and serves canned replies.
 * Outbound calls are fire-and-forget except the two queries, which are
 * blocking round-trips that fail when the window is already gone.
 */
pub trait XConn {
    /// Root window dimensions in pixels
    fn screen_size(&self) -> (u32, u32);

    /// Claim substructure redirection on the root window. Fails if another
    /// window manager is already running.
    fn register_wm(&self) -> Result<()>;

    /// Block until the next event arrives. `None` means the event was not
    /// interesting, not that the stream ended.
    fn wait_for_event(&self) -> Option<XEvent>;

    fn connection_ok(&self) -> bool;

    fn flush(&self);

    fn query_geometry(&self, win: Window) -> Result<Rectangle>;

    fn query_pointer(&self) -> Result<Point>;

    /// One-shot geometry and/or border-width change with an optional raise
    fn configure_window(
        &self,
        win: Window,
        region: Option<Rectangle>,
        border_width: Option<u32>,
        stack_above: bool,
    );

    /// Move without resizing (drag path)
    fn position_window(&self, win: Window, x: i32, y: i32);

    /// Resize without moving (drag path)
    fn resize_window(&self, win: Window, w: u32, h: u32);

    /// Grant a client's own ConfigureRequest. Stacking fields are only
    /// forwarded when `honor_stacking` is set (unmanaged windows).
    fn apply_configure_request(&self, data: &ConfigureRequestData, honor_stacking: bool);

    fn map_window(&self, win: Window);

    fn unmap_window(&self, win: Window);

    fn set_border_color(&self, win: Window, color: u32);

    fn focus_window(&self, win: Window);

    fn focus_nothing(&self);

    /// Warp the pointer to (x, y) relative to the window's origin
    fn warp_pointer(&self, win: Window, x: u32, y: u32);

    fn grab_pointer(&self);

    fn ungrab_pointer(&self);

    fn grab_key(&self, mod_mask: u16, keysym: u32);

    fn ungrab_keys(&self);

    fn grab_button(&self, mod_mask: u16, button: u8);

    /// Restrict a window's reported events to pointer entry plus key
    /// release (cycle mode)
    fn release_events_only(&self, win: Window);

    /// Restore a window's normal event mask
    fn normal_events(&self, win: Window);

    /// Close a window: politely via WM_DELETE_WINDOW when advertised,
    /// otherwise by killing the client
    fn close_window(&self, win: Window);

    /// True for dock / toolbar / desktop type windows, which are mapped but
    /// never managed
    fn window_is_dock_like(&self, win: Window) -> bool;

    /// Release all grabs and drop the active-window marker before exit
    fn cleanup(&self);
}

/// Handles communication with an X server via xcb
pub struct XcbConnection {
    conn: ewmh::Connection,
    preferred_screen: i32,
    root: Window,
    screen_width: u32,
    screen_height: u32,
    atoms: InternedAtoms,
}

impl XcbConnection {
    pub fn new() -> Result<XcbConnection> {
        let (conn, preferred_screen) =
            xcb::Connection::connect(None).context("Unable to connect to X server")?;
        let conn = ewmh::Connection::connect(conn).map_err(|(e, _)| e)?;

        let (root, screen_width, screen_height) = {
            let screen = conn
                .get_setup()
                .roots()
                .nth(preferred_screen as usize)
                .context("Unable to get the root window of the preferred screen")?;
            (
                screen.root(),
                screen.width_in_pixels() as u32,
                screen.height_in_pixels() as u32,
            )
        };

        let atoms = InternedAtoms::new(&conn).context("Failed to intern atoms")?;

        Ok(XcbConnection {
            conn,
            preferred_screen,
            root,
            screen_width,
            screen_height,
            atoms,
        })
    }

    pub fn root(&self) -> Window {
        self.root
    }

    fn lookup_keysym(&self, e: &xcb::KeyPressEvent) -> u32 {
        keysyms::KeySymbols::new(&self.conn).press_lookup_keysym(e, 0)
    }

    /// Queries the WM_PROTOCOLS property of a window, returning a list of
    /// the protocols that it supports.
    fn get_wm_protocols(&self, id: Window) -> Result<Vec<Atom>> {
        let reply =
            icccm::get_wm_protocols(&self.conn, id, self.conn.WM_PROTOCOLS()).get_reply()?;
        Ok(reply.atoms().to_vec())
    }

    fn send_client_message_event(&self, win: Window, atom: Atom) {
        let data = xcb::ClientMessageData::from_data32([atom, xcb::CURRENT_TIME, 0, 0, 0]);
        let event = xcb::ClientMessageEvent::new(32, win, self.conn.WM_PROTOCOLS(), data);
        xcb::send_event(&self.conn, false, win, xcb::EVENT_MASK_NO_EVENT, &event);
    }

    fn set_event_mask(&self, win: Window, mask: u32) {
        xcb::change_window_attributes(&self.conn, win, &[(xcb::CW_EVENT_MASK, mask)]);
    }
}

impl XConn for XcbConnection {
    fn screen_size(&self) -> (u32, u32) {
        (self.screen_width, self.screen_height)
    }

    fn register_wm(&self) -> Result<()> {
        // Register for substructure redirection; only one client may hold
        // it, so this doubles as the "are we the WM" check.
        xcb::change_window_attributes_checked(&self.conn, self.root, ROOT_EVENT_MASK)
            .request_check()
            .context("Could not register SUBSTRUCTURE_NOTIFY/REDIRECT")?;

        ewmh::set_supported(
            &self.conn,
            self.preferred_screen,
            &[
                self.conn.SUPPORTED(),
                self.conn.WM_STATE(),
                self.conn.WM_STATE_FULLSCREEN(),
            ],
        );
        self.conn.flush();
        Ok(())
    }

    fn wait_for_event(&self) -> Option<XEvent> {
        self.conn.wait_for_event().and_then(|event| {
            let etype = event.response_type() & XCB_RESPONSE_TYPE_MASK;
            match etype {
                xcb::BUTTON_PRESS => {
                    let e: &xcb::ButtonPressEvent = unsafe { xcb::cast_event(&event) };
                    Some(XEvent::ButtonPress {
                        id: e.child(),
                        point: Point::new(e.root_x() as i32, e.root_y() as i32),
                        mod_mask: e.state(),
                        button: e.detail(),
                    })
                }

                xcb::BUTTON_RELEASE => Some(XEvent::ButtonRelease),

                xcb::MOTION_NOTIFY => Some(XEvent::MotionNotify),

                xcb::ENTER_NOTIFY => {
                    let e: &xcb::EnterNotifyEvent = unsafe { xcb::cast_event(&event) };
                    Some(XEvent::EnterNotify { id: e.event() })
                }

                xcb::KEY_PRESS => {
                    let e: &xcb::KeyPressEvent = unsafe { xcb::cast_event(&event) };
                    Some(XEvent::KeyPress {
                        key: KeyCombo {
                            mod_mask: e.state(),
                            keysym: self.lookup_keysym(e),
                        },
                    })
                }

                xcb::KEY_RELEASE => {
                    let e: &xcb::KeyReleaseEvent = unsafe { xcb::cast_event(&event) };
                    Some(XEvent::KeyRelease {
                        key: KeyCombo {
                            mod_mask: e.state(),
                            keysym: self.lookup_keysym(e),
                        },
                    })
                }

                xcb::MAP_REQUEST => {
                    let e: &xcb::MapRequestEvent = unsafe { xcb::cast_event(&event) };
                    Some(XEvent::MapRequest { id: e.window() })
                }

                xcb::UNMAP_NOTIFY => {
                    let e: &xcb::UnmapNotifyEvent = unsafe { xcb::cast_event(&event) };
                    Some(XEvent::UnmapNotify { id: e.window() })
                }

                xcb::DESTROY_NOTIFY => {
                    let e: &xcb::DestroyNotifyEvent = unsafe { xcb::cast_event(&event) };
                    Some(XEvent::DestroyNotify { id: e.window() })
                }

                xcb::CLIENT_MESSAGE => {
                    let e: &xcb::ClientMessageEvent = unsafe { xcb::cast_event(&event) };
                    if e.type_() != self.conn.WM_STATE() {
                        return None;
                    }
                    let data = e.data().data32();
                    let wants_fullscreen = data[1..3]
                        .iter()
                        .any(|&a| a == self.conn.WM_STATE_FULLSCREEN());
                    if !wants_fullscreen {
                        return None;
                    }
                    let action = match data[0] {
                        NET_WM_STATE_REMOVE => StateAction::Remove,
                        NET_WM_STATE_ADD => StateAction::Add,
                        NET_WM_STATE_TOGGLE => StateAction::Toggle,
                        _ => return None,
                    };
                    Some(XEvent::FullscreenRequest {
                        id: e.window(),
                        action,
                    })
                }

                xcb::CONFIGURE_REQUEST => {
                    let e: &xcb::ConfigureRequestEvent = unsafe { xcb::cast_event(&event) };
                    let mask = e.value_mask();
                    let has = |bit: u16| mask & bit != 0;
                    Some(XEvent::ConfigureRequest(ConfigureRequestData {
                        id: e.window(),
                        x: if has(CONFIG_WINDOW_X) {
                            Some(e.x() as i32)
                        } else {
                            None
                        },
                        y: if has(CONFIG_WINDOW_Y) {
                            Some(e.y() as i32)
                        } else {
                            None
                        },
                        width: if has(CONFIG_WINDOW_WIDTH) {
                            Some(e.width() as u32)
                        } else {
                            None
                        },
                        height: if has(CONFIG_WINDOW_HEIGHT) {
                            Some(e.height() as u32)
                        } else {
                            None
                        },
                        sibling: if has(CONFIG_WINDOW_SIBLING) {
                            Some(e.sibling())
                        } else {
                            None
                        },
                        stack_mode: if has(CONFIG_WINDOW_STACK_MODE) {
                            Some(e.stack_mode() as u32)
                        } else {
                            None
                        },
                    }))
                }

                xcb::MAPPING_NOTIFY => {
                    let e: &xcb::MappingNotifyEvent = unsafe { xcb::cast_event(&event) };
                    if e.request() == xcb::MAPPING_MODIFIER as u8
                        || e.request() == xcb::MAPPING_KEYBOARD as u8
                    {
                        Some(XEvent::MappingNotify)
                    } else {
                        None
                    }
                }

                // NOTE: ignoring other event types
                _ => None,
            }
        })
    }

    fn connection_ok(&self) -> bool {
        self.conn.has_error().is_ok()
    }

    fn flush(&self) {
        self.conn.flush();
    }

    fn query_geometry(&self, win: Window) -> Result<Rectangle> {
        let reply = xcb::get_geometry(&self.conn, win)
            .get_reply()
            .with_context(|| format!("no geometry for window {}", win))?;
        Ok(Rectangle::new(
            reply.x() as i32,
            reply.y() as i32,
            reply.width() as u32,
            reply.height() as u32,
        ))
    }

    fn query_pointer(&self) -> Result<Point> {
        let reply = xcb::query_pointer(&self.conn, self.root)
            .get_reply()
            .map_err(|e| anyhow!("pointer query failed: {:?}", e))?;
        Ok(Point::new(reply.root_x() as i32, reply.root_y() as i32))
    }

    fn configure_window(
        &self,
        win: Window,
        region: Option<Rectangle>,
        border_width: Option<u32>,
        stack_above: bool,
    ) {
        let mut args = vec![];
        if let Some(r) = region {
            let (x, y, w, h) = r.values();
            args.append(&mut vec![
                (CONFIG_WINDOW_X, x as u32),
                (CONFIG_WINDOW_Y, y as u32),
                (CONFIG_WINDOW_WIDTH, w),
                (CONFIG_WINDOW_HEIGHT, h),
            ]);
        }
        if let Some(bw) = border_width {
            args.push((CONFIG_WINDOW_BORDER_WIDTH, bw));
        }
        if stack_above {
            args.push((CONFIG_WINDOW_STACK_MODE, STACK_MODE_ABOVE));
        }
        xcb::configure_window(&self.conn, win, &args);
    }

    fn position_window(&self, win: Window, x: i32, y: i32) {
        xcb::configure_window(
            &self.conn,
            win,
            &[(CONFIG_WINDOW_X, x as u32), (CONFIG_WINDOW_Y, y as u32)],
        );
    }

    fn resize_window(&self, win: Window, w: u32, h: u32) {
        xcb::configure_window(
            &self.conn,
            win,
            &[(CONFIG_WINDOW_WIDTH, w), (CONFIG_WINDOW_HEIGHT, h)],
        );
    }

    fn apply_configure_request(&self, data: &ConfigureRequestData, honor_stacking: bool) {
        let mut args = vec![];
        if let Some(x) = data.x {
            args.push((CONFIG_WINDOW_X, x as u32));
        }
        if let Some(y) = data.y {
            args.push((CONFIG_WINDOW_Y, y as u32));
        }
        if let Some(w) = data.width {
            args.push((CONFIG_WINDOW_WIDTH, w));
        }
        if let Some(h) = data.height {
            args.push((CONFIG_WINDOW_HEIGHT, h));
        }
        if honor_stacking {
            if let Some(sibling) = data.sibling {
                args.push((CONFIG_WINDOW_SIBLING, sibling));
            }
            if let Some(mode) = data.stack_mode {
                args.push((CONFIG_WINDOW_STACK_MODE, mode));
            }
        }
        if !args.is_empty() {
            xcb::configure_window(&self.conn, data.id, &args);
        }
    }

    fn map_window(&self, win: Window) {
        xcb::map_window(&self.conn, win);
    }

    fn unmap_window(&self, win: Window) {
        xcb::unmap_window(&self.conn, win);
    }

    fn set_border_color(&self, win: Window, color: u32) {
        xcb::change_window_attributes(&self.conn, win, &[(xcb::CW_BORDER_PIXEL, color)]);
    }

    fn focus_window(&self, win: Window) {
        xcb::set_input_focus(
            &self.conn,
            INPUT_FOCUS_POINTER_ROOT,
            win,
            xcb::CURRENT_TIME, // current time to avoid network race conditions
        );
        ewmh::set_active_window(&self.conn, self.preferred_screen, win);
    }

    /// Unsets EWMH's _NET_ACTIVE_WINDOW to indicate there is no active window.
    fn focus_nothing(&self) {
        ewmh::set_active_window(&self.conn, self.preferred_screen, xcb::NONE);
    }

    fn warp_pointer(&self, win: Window, x: u32, y: u32) {
        xcb::warp_pointer(&self.conn, xcb::NONE, win, 0, 0, 0, 0, x as i16, y as i16);
    }

    fn grab_pointer(&self) {
        xcb::grab_pointer(
            &self.conn,
            false,
            self.root,
            POINTER_GRAB_MASK,
            GRAB_MODE_ASYNC,
            GRAB_MODE_ASYNC,
            self.root,
            xcb::NONE,
            xcb::CURRENT_TIME,
        );
    }

    fn ungrab_pointer(&self) {
        xcb::ungrab_pointer(&self.conn, xcb::CURRENT_TIME);
    }

    fn grab_key(&self, mod_mask: u16, keysym: u32) {
        let syms = keysyms::KeySymbols::new(&self.conn);
        for code in syms.get_keycode(keysym) {
            xcb::grab_key(
                &self.conn,
                false,
                self.root,
                mod_mask,
                code,
                GRAB_MODE_ASYNC,
                GRAB_MODE_ASYNC,
            );
        }
    }

    fn ungrab_keys(&self) {
        xcb::ungrab_key(
            &self.conn,
            xcb::GRAB_ANY as u8,
            self.root,
            xcb::MOD_MASK_ANY as u16,
        );
    }

    fn grab_button(&self, mod_mask: u16, button: u8) {
        xcb::grab_button(
            &self.conn,
            false,
            self.root,
            BUTTON_GRAB_MASK,
            GRAB_MODE_ASYNC,
            GRAB_MODE_ASYNC,
            self.root,
            xcb::NONE,
            button,
            mod_mask,
        );
    }

    fn release_events_only(&self, win: Window) {
        self.set_event_mask(win, RELEASE_WINDOW_EVENTS);
    }

    fn normal_events(&self, win: Window) {
        self.set_event_mask(win, NORMAL_WINDOW_EVENTS);
    }

    fn close_window(&self, win: Window) {
        let atom = self.atoms.WM_DELETE_WINDOW;
        let has_wm_delete_window = self
            .get_wm_protocols(win)
            .map(|protocols| protocols.contains(&atom))
            .unwrap_or(false);

        if has_wm_delete_window {
            info!("closing window {} via WM_DELETE_WINDOW", win);
            self.send_client_message_event(win, atom);
        } else {
            info!("killing window {}", win);
            xcb::kill_client(&self.conn, win);
        }
    }

    fn window_is_dock_like(&self, win: Window) -> bool {
        let reply = match ewmh::get_wm_window_type(&self.conn, win).get_reply() {
            Ok(r) => r,
            Err(_) => return false,
        };
        reply.atoms().iter().any(|&t| {
            t == self.conn.WM_WINDOW_TYPE_DOCK()
                || t == self.conn.WM_WINDOW_TYPE_TOOLBAR()
                || t == self.conn.WM_WINDOW_TYPE_DESKTOP()
        })
    }

    fn cleanup(&self) {
        self.ungrab_keys();
        self.focus_nothing();
        self.conn.flush();
    }
}
