use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use simplelog::{LevelFilter, SimpleLogger};

use snapwm::{Config, WindowManager, XcbConnection};

fn config_path() -> Option<PathBuf> {
    if let Ok(dir) = env::var("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(dir).join("snapwm/snapwmrc"));
    }
    env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".config/snapwm/snapwmrc"))
}

fn main() -> Result<()> {
    SimpleLogger::init(LevelFilter::Info, simplelog::Config::default())?;

    let config = match config_path() {
        Some(path) => Config::load(&path),
        None => Config::default(),
    };

    let conn = XcbConnection::new()?;
    let mut wm = WindowManager::new(&conn, config).context("failed to start snapwm")?;
    wm.run();

    Ok(())
}
