use std::fs;
use std::path::Path;

/// The main user facing configuration details
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of workspaces. Exactly one is visible at a time.
    pub workspace_count: usize,
    /// The width of window borders in pixels
    pub border_px: u32,
    /// The size of gaps between snapped windows and the screen edge in pixels
    pub gap_px: u32,
    /// Height of the band reserved at the top of the screen (status bar)
    pub top_reserved_px: u32,
    /// Height of the band reserved at the bottom of the screen
    pub bottom_reserved_px: u32,
    /// Distance from a screen edge within which a drag starts snapping
    pub snap_margin_px: u32,
    /// Distance along an edge within which a snap becomes a corner snap
    pub snap_corner_px: u32,
    /// Ignore gaps when maximizing: flush to the screen edges minus border
    pub smart_snap_max: bool,
    /// Focused border color
    pub focused_border_color: u32,
    /// Unfocused border color
    pub unfocused_border_color: u32,
    /// Modifier for all default key and mouse bindings
    pub mod_mask: u16,
    /// Raw `bind` lines from the config file, applied over the defaults
    pub extra_binds: Vec<(String, Vec<String>)>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            workspace_count: 4,
            border_px: 5,
            gap_px: 10,
            top_reserved_px: 34,
            bottom_reserved_px: 0,
            snap_margin_px: 5,
            snap_corner_px: 256,
            smart_snap_max: true,
            focused_border_color: 0x81a1c1,   // #81a1c1
            unfocused_border_color: 0x3b4252, // #3b4252
            mod_mask: xcb::MOD_MASK_4 as u16,
            extra_binds: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from a `key = value` file, falling back to the
    /// defaults for anything the file does not mention. A missing file is
    /// not an error. Unknown keys and unparsable values are skipped with a
    /// warning so a typo never takes the whole config down.
    pub fn load(path: &Path) -> Config {
        let mut config = Config::default();
        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(_) => {
                info!("no config file at {}, using defaults", path.display());
                return config;
            }
        };

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let words: Vec<&str> = line.split_whitespace().collect();
            match words.as_slice() {
                [key, "=", value] => config.set_value(key, value),
                ["bind", key, action @ ..] if !action.is_empty() => {
                    config.extra_binds.push((
                        key.to_string(),
                        action.iter().map(|s| s.to_string()).collect(),
                    ));
                }
                _ => warn!("ignoring malformed config line: {}", line),
            }
        }

        config
    }

    fn set_value(&mut self, key: &str, value: &str) {
        let parsed = match key {
            "focuscol" | "unfocuscol" => parse_color(value),
            _ => value.parse::<u32>().ok(),
        };
        let val = match parsed {
            Some(v) => v,
            None => {
                warn!("ignoring bad config value: {} = {}", key, value);
                return;
            }
        };
        match key {
            "workspaces" if val >= 1 => self.workspace_count = val as usize,
            "border" => self.border_px = val,
            "gap" => self.gap_px = val,
            "top" => self.top_reserved_px = val,
            "bot" => self.bottom_reserved_px = val,
            "snap_margin" => self.snap_margin_px = val,
            "snap_corner" => self.snap_corner_px = val,
            "smart_max" => self.smart_snap_max = val != 0,
            "focuscol" => self.focused_border_color = val,
            "unfocuscol" => self.unfocused_border_color = val,
            "mod" => {
                self.mod_mask = match val {
                    1 => xcb::MOD_MASK_1 as u16,
                    4 => xcb::MOD_MASK_4 as u16,
                    _ => {
                        warn!("ignoring bad modifier: mod = {}", val);
                        return;
                    }
                }
            }
            _ => warn!("ignoring unknown config key: {}", key),
        }
    }
}

fn parse_color(value: &str) -> Option<u32> {
    let hex = value.trim_start_matches("0x").trim_start_matches('#');
    u32::from_str_radix(hex, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn missing_file_gives_defaults() {
        let config = Config::load(Path::new("/nonexistent/snapwmrc"));
        let defaults = Config::default();
        assert_eq!(config.border_px, defaults.border_px);
        assert_eq!(config.gap_px, defaults.gap_px);
        assert!(config.extra_binds.is_empty());
    }

    #[test]
    fn values_and_binds_are_parsed() {
        let dir = std::env::temp_dir();
        let path = dir.join("snapwm-test-config");
        let mut f = fs::File::create(&path).unwrap();
        writeln!(f, "# comment").unwrap();
        writeln!(f, "border = 2").unwrap();
        writeln!(f, "gap = 16").unwrap();
        writeln!(f, "focuscol = 0xcc241d").unwrap();
        writeln!(f, "unfocuscol = #3c3836").unwrap();
        writeln!(f, "smart_max = 0").unwrap();
        writeln!(f, "bind M-Return exec alacritty").unwrap();
        writeln!(f, "nonsense line here = =").unwrap();
        drop(f);

        let config = Config::load(&path);
        fs::remove_file(&path).ok();

        assert_eq!(config.border_px, 2);
        assert_eq!(config.gap_px, 16);
        assert_eq!(config.focused_border_color, 0xcc241d);
        assert_eq!(config.unfocused_border_color, 0x3c3836);
        assert!(!config.smart_snap_max);
        assert_eq!(
            config.extra_binds,
            vec![(
                "M-Return".to_string(),
                vec!["exec".to_string(), "alacritty".to_string()]
            )]
        );
    }
}
