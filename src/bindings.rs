use std::collections::HashMap;
use std::process::{Command, Stdio};

use crate::{config::Config, geometry::SnapZone, xconnection::KeyCombo};

/// X keysym values for the non-printable keys we care about. Printable
/// ASCII keys use their codepoint as the keysym.
pub mod keysym {
    pub const XK_TAB: u32 = 0xff09;
    pub const XK_RETURN: u32 = 0xff0d;
    pub const XK_ESCAPE: u32 = 0xff1b;
    pub const XK_SPACE: u32 = 0x20;
    pub const XK_LEFT: u32 = 0xff51;
    pub const XK_UP: u32 = 0xff52;
    pub const XK_RIGHT: u32 = 0xff53;
    pub const XK_DOWN: u32 = 0xff54;
    pub const XK_SUPER_L: u32 = 0xffeb;
}

/// Everything a key binding can do.
#[derive(Debug, PartialEq, Clone)]
pub enum Action {
    /// Run an external command
    Exec(String),
    /// Close the focused window (politely where supported)
    Close,
    /// Step through the current workspace's stack
    Cycle,
    /// Snap the focused window to a half / quadrant / maximized rectangle
    Snap(SnapZone),
    /// Toggle keybind-driven fullscreen on the focused window
    ToggleFullscreen,
    /// Make another workspace the visible one
    SwitchWorkspace(usize),
    /// Move the focused window to another workspace
    SendToWorkspace(usize),
    /// Shut the window manager down
    Exit,
}

/// Pointer bindings start drags rather than firing one-shot actions.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum MouseAction {
    Move,
    Resize,
}

struct DefaultBinding {
    key: &'static str,
    action: &'static [&'static str],
}

static DEFAULT_BINDINGS: &[DefaultBinding] = &[
    DefaultBinding { key: "M-Return", action: &["exec", "xterm"] },
    DefaultBinding { key: "M-q", action: &["close"] },
    DefaultBinding { key: "M-S-q", action: &["exit"] },
    DefaultBinding { key: "M-Tab", action: &["cycle"] },
    DefaultBinding { key: "M-Left", action: &["snap_left"] },
    DefaultBinding { key: "M-Right", action: &["snap_right"] },
    DefaultBinding { key: "M-f", action: &["snap_max"] },
    DefaultBinding { key: "M-S-f", action: &["fullscreen"] },
    DefaultBinding { key: "M-1", action: &["workspace", "1"] },
    DefaultBinding { key: "M-2", action: &["workspace", "2"] },
    DefaultBinding { key: "M-3", action: &["workspace", "3"] },
    DefaultBinding { key: "M-4", action: &["workspace", "4"] },
    DefaultBinding { key: "M-S-1", action: &["send", "1"] },
    DefaultBinding { key: "M-S-2", action: &["send", "2"] },
    DefaultBinding { key: "M-S-3", action: &["send", "3"] },
    DefaultBinding { key: "M-S-4", action: &["send", "4"] },
];

/// User defined key and mouse bindings, looked up by the event dispatcher.
pub struct Bindings {
    keys: HashMap<KeyCombo, Action>,
    buttons: HashMap<(u16, u8), MouseAction>,
}

impl Bindings {
    /// Build the default table for the configured modifier, then layer the
    /// config file's `bind` lines on top (later lines win).
    pub fn new(config: &Config) -> Bindings {
        let mut bindings = Bindings {
            keys: HashMap::new(),
            buttons: HashMap::new(),
        };

        for binding in DEFAULT_BINDINGS {
            let words: Vec<String> = binding.action.iter().map(|s| s.to_string()).collect();
            bindings.bind(config, binding.key, &words);
        }
        for (key, action) in &config.extra_binds {
            bindings.bind(config, key, action);
        }

        bindings
            .buttons
            .insert((config.mod_mask, xcb::BUTTON_INDEX_1 as u8), MouseAction::Move);
        bindings
            .buttons
            .insert((config.mod_mask, xcb::BUTTON_INDEX_3 as u8), MouseAction::Resize);

        bindings
    }

    fn bind(&mut self, config: &Config, key: &str, action_words: &[String]) {
        let combo = match parse_key_combo(key, config.mod_mask) {
            Some(c) => c,
            None => {
                warn!("invalid key binding: {}", key);
                return;
            }
        };
        match parse_action(action_words, config.workspace_count) {
            Some(action) => {
                self.keys.insert(combo, action);
            }
            None => warn!("invalid action for {}: {:?}", key, action_words),
        }
    }

    pub fn key_action(&self, key: &KeyCombo) -> Option<Action> {
        self.keys.get(key).cloned()
    }

    pub fn button_action(&self, mod_mask: u16, button: u8) -> Option<MouseAction> {
        self.buttons.get(&(mod_mask, button)).copied()
    }

    pub fn keys(&self) -> impl Iterator<Item = &KeyCombo> {
        self.keys.keys()
    }

    pub fn buttons(&self) -> impl Iterator<Item = &(u16, u8)> {
        self.buttons.keys()
    }
}

/**
 * Convert user friendly key specs into a modifier mask + keysym pair.
 *
 * Bindings are of the form '<MOD>-<key name>' with multiple modifiers
 * allowed: 'M-S-f' is mod+shift+f. Allowed modifiers are M (the configured
 * modifier), A (alt), C (ctrl) and S (shift). Key names are single
 * printable characters or one of the named keys in [`keysym`].
 */
fn parse_key_combo(pattern: &str, mod_mask: u16) -> Option<KeyCombo> {
    let mut parts: Vec<&str> = pattern.split('-').collect();
    let name = parts.pop()?;
    let keysym = keysym_from_name(name)?;

    let mut mask: u16 = 0;
    for part in parts {
        mask |= match part {
            "M" => mod_mask,
            "A" => xcb::MOD_MASK_1 as u16,
            "C" => xcb::MOD_MASK_CONTROL as u16,
            "S" => xcb::MOD_MASK_SHIFT as u16,
            _ => return None,
        };
    }

    Some(KeyCombo {
        mod_mask: mask,
        keysym,
    })
}

fn keysym_from_name(name: &str) -> Option<u32> {
    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if c.is_ascii_graphic() {
            return Some(c as u32);
        }
    }
    match name {
        "Return" => Some(keysym::XK_RETURN),
        "Tab" => Some(keysym::XK_TAB),
        "Escape" => Some(keysym::XK_ESCAPE),
        "space" => Some(keysym::XK_SPACE),
        "Left" => Some(keysym::XK_LEFT),
        "Up" => Some(keysym::XK_UP),
        "Right" => Some(keysym::XK_RIGHT),
        "Down" => Some(keysym::XK_DOWN),
        _ => None,
    }
}

fn parse_action(words: &[String], workspace_count: usize) -> Option<Action> {
    let (first, rest) = words.split_first()?;
    let action = match first.as_str() {
        "exec" if !rest.is_empty() => Action::Exec(rest.join(" ")),
        "close" => Action::Close,
        "cycle" => Action::Cycle,
        "snap_left" => Action::Snap(SnapZone::Left),
        "snap_right" => Action::Snap(SnapZone::Right),
        "snap_up_left" => Action::Snap(SnapZone::LeftUp),
        "snap_down_left" => Action::Snap(SnapZone::LeftDown),
        "snap_up_right" => Action::Snap(SnapZone::RightUp),
        "snap_down_right" => Action::Snap(SnapZone::RightDown),
        "snap_max" => Action::Snap(SnapZone::Max),
        "fullscreen" => Action::ToggleFullscreen,
        "workspace" => Action::SwitchWorkspace(parse_workspace(rest, workspace_count)?),
        "send" => Action::SendToWorkspace(parse_workspace(rest, workspace_count)?),
        "exit" => Action::Exit,
        _ => return None,
    };
    Some(action)
}

// Workspaces are 1-based for users, 0-based internally.
fn parse_workspace(rest: &[String], workspace_count: usize) -> Option<usize> {
    let n: usize = rest.first()?.parse().ok()?;
    if n >= 1 && n <= workspace_count {
        Some(n - 1)
    } else {
        None
    }
}

/**
 * Run an external command.
 *
 * This redirects the process stdout and stderr to /dev/null.
 * Logs a warning if there were any errors in kicking off the process.
 */
pub fn spawn(cmd: &str) {
    let parts: Vec<&str> = cmd.split_whitespace().collect();
    let (program, args) = match parts.split_first() {
        Some(split) => split,
        None => return,
    };

    let result = Command::new(program)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();

    if let Err(e) = result {
        warn!("error spawning external program: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MOD: u16 = xcb::MOD_MASK_4 as u16;
    const SHIFT: u16 = xcb::MOD_MASK_SHIFT as u16;

    #[test]
    fn key_specs_parse_modifiers_and_names() {
        assert_eq!(
            parse_key_combo("M-S-f", MOD),
            Some(KeyCombo {
                mod_mask: MOD | SHIFT,
                keysym: 'f' as u32
            })
        );
        assert_eq!(
            parse_key_combo("M-Tab", MOD),
            Some(KeyCombo {
                mod_mask: MOD,
                keysym: keysym::XK_TAB
            })
        );
        assert_eq!(parse_key_combo("X-q", MOD), None);
        assert_eq!(parse_key_combo("M-NoSuchKey", MOD), None);
    }

    #[test]
    fn default_table_covers_core_actions() {
        let config = Config::default();
        let bindings = Bindings::new(&config);

        let combo = KeyCombo {
            mod_mask: MOD,
            keysym: keysym::XK_TAB,
        };
        assert_eq!(bindings.key_action(&combo), Some(Action::Cycle));

        let combo = KeyCombo {
            mod_mask: MOD | SHIFT,
            keysym: '2' as u32,
        };
        assert_eq!(
            bindings.key_action(&combo),
            Some(Action::SendToWorkspace(1))
        );

        assert_eq!(
            bindings.button_action(MOD, xcb::BUTTON_INDEX_1 as u8),
            Some(MouseAction::Move)
        );
        assert_eq!(bindings.button_action(0, xcb::BUTTON_INDEX_1 as u8), None);
    }

    #[test]
    fn config_binds_override_defaults() {
        let mut config = Config::default();
        config.extra_binds.push((
            "M-q".to_string(),
            vec!["exec".to_string(), "st".to_string()],
        ));
        config
            .extra_binds
            .push(("M-j".to_string(), vec!["snap_down_left".to_string()]));
        let bindings = Bindings::new(&config);

        let combo = KeyCombo {
            mod_mask: MOD,
            keysym: 'q' as u32,
        };
        assert_eq!(bindings.key_action(&combo), Some(Action::Exec("st".into())));

        let combo = KeyCombo {
            mod_mask: MOD,
            keysym: 'j' as u32,
        };
        assert_eq!(
            bindings.key_action(&combo),
            Some(Action::Snap(SnapZone::LeftDown))
        );
    }

    #[test]
    fn out_of_range_workspaces_are_rejected() {
        assert_eq!(
            parse_action(&["workspace".into(), "4".into()], 4),
            Some(Action::SwitchWorkspace(3))
        );
        assert_eq!(parse_action(&["workspace".into(), "5".into()], 4), None);
        assert_eq!(parse_action(&["send".into(), "0".into()], 4), None);
    }
}
