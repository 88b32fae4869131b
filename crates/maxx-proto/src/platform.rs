use std::path::PathBuf;

/// Fixed TCP port the remote control talks to.
pub const REMOTE_TCP_PORT: u16 = 8080;

const APP_DIR: &str = "streammaxx";

pub fn data_dir() -> PathBuf {
    // On macOS and Linux, use ~/.local/share/streammaxx/ (XDG standard)
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join(APP_DIR)
    }
    #[cfg(windows)]
    {
        // Portable install: data/ next to the executable wins
        if let Some(dir) = beside_exe("data") {
            return dir;
        }

        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
}

pub fn config_dir() -> PathBuf {
    #[cfg(windows)]
    {
        if let Some(path) = beside_exe("config.toml") {
            if let Some(dir) = path.parent() {
                return dir.to_path_buf();
            }
        }
    }

    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join(APP_DIR)
    }

    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
}

pub fn temp_dir() -> PathBuf {
    std::env::temp_dir()
}

/// Where fetched `.torrent` files land by default.
pub fn downloads_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(temp_dir)
        .join(APP_DIR)
}

pub fn log_path() -> PathBuf {
    data_dir().join("streammaxx.log")
}

#[cfg(windows)]
fn beside_exe(name: &str) -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let candidate = exe.parent()?.join(name);
    candidate.exists().then_some(candidate)
}

/// Locate an executable on `PATH`.
pub fn find_on_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var("PATH").ok()?;
    #[cfg(unix)]
    let (sep, names) = (":", [name.to_string()]);
    #[cfg(windows)]
    let (sep, names) = (";", [format!("{}.exe", name)]);
    for dir in path.split(sep) {
        for candidate in &names {
            let p = PathBuf::from(dir).join(candidate);
            if p.exists() {
                return Some(p);
            }
        }
    }
    None
}
