//! Side effects of playback decisions: the player process and key injection.

use std::future::Future;
use std::process::Stdio;

use maxx_proto::catalog::QualityOption;
use maxx_proto::config::{KeysConfig, PlaybackConfig};
use maxx_proto::error::ActionError;
use maxx_proto::machine::PlayerKey;
use reqwest::Client;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::yts;

/// Placeholder in `player_args` replaced by the media path or link.
pub const MEDIA_PLACEHOLDER: &str = "{media}";

/// What the core calls to realize decisions.  Owned by the core task only.
pub trait Actions: Send {
    fn start_playback(
        &mut self,
        option: &QualityOption,
    ) -> impl Future<Output = Result<(), ActionError>> + Send;

    fn stop_playback(&mut self) -> impl Future<Output = ()> + Send;

    fn inject_key(&mut self, key: PlayerKey) -> impl Future<Output = Result<(), ActionError>> + Send;

    /// Whether the last started player is still running.
    fn player_alive(&mut self) -> bool;
}

/// Spawns the configured player and key tool as child processes.
pub struct ProcessActions {
    client: Client,
    playback: PlaybackConfig,
    keys: KeysConfig,
    player: Option<Child>,
}

impl ProcessActions {
    pub fn new(client: Client, playback: PlaybackConfig, keys: KeysConfig) -> Self {
        Self {
            client,
            playback,
            keys,
            player: None,
        }
    }
}

/// Terminate every process called `name`.
async fn kill_by_name(name: &str) {
    #[cfg(unix)]
    let result = Command::new("pkill")
        .arg("-x")
        .arg(name)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    #[cfg(windows)]
    let result = Command::new("taskkill")
        .args(["/F", "/IM", name])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    match result {
        Ok(status) => debug!("kill {}: {}", name, status),
        Err(e) => warn!("failed to kill {}: {}", name, e),
    }
}

/// Player argument list with the media placeholder substituted.
pub fn player_args(template: &[String], media: &str) -> Vec<String> {
    template
        .iter()
        .map(|arg| arg.replace(MEDIA_PLACEHOLDER, media))
        .collect()
}

/// Key name passed to the key tool.
pub fn key_name(key: PlayerKey, filler: &str) -> &str {
    match key {
        PlayerKey::PlayPause => "space",
        PlayerKey::SeekForward => "Right",
        PlayerKey::SeekBack => "Left",
        PlayerKey::Filler => filler,
    }
}

impl Actions for ProcessActions {
    async fn start_playback(&mut self, option: &QualityOption) -> Result<(), ActionError> {
        if let Some(mut old) = self.player.take() {
            warn!("player still running at start, killing it");
            if let Err(e) = old.kill().await {
                warn!("player: kill of previous player failed: {}", e);
            }
        }

        let media = if self.playback.download_first {
            let path =
                yts::download_torrent(&self.client, option, &self.playback.downloads_dir).await?;
            path.to_string_lossy().into_owned()
        } else {
            option.link.clone()
        };

        let args = player_args(&self.playback.player_args, &media);
        info!(
            "player: spawning {} {:?} ({})",
            self.playback.player_command, args, option.label
        );
        let child = Command::new(&self.playback.player_command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ActionError::Spawn(format!("{}: {}", self.playback.player_command, e)))?;
        info!("player: spawned process with pid {:?}", child.id());
        self.player = Some(child);
        Ok(())
    }

    async fn stop_playback(&mut self) {
        if let Some(mut child) = self.player.take() {
            info!("player: stopping pid {:?}", child.id());
            if let Err(e) = child.kill().await {
                warn!("player: kill failed: {}", e);
            }
        }
        if let Some(name) = self.playback.process_name.clone() {
            kill_by_name(&name).await;
        }
    }

    async fn inject_key(&mut self, key: PlayerKey) -> Result<(), ActionError> {
        let name = key_name(key, &self.keys.filler);
        debug!("key: {} {:?} {}", self.keys.command, self.keys.args_prefix, name);
        let status = Command::new(&self.keys.command)
            .args(&self.keys.args_prefix)
            .arg(name)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| ActionError::KeyTool(format!("{}: {}", self.keys.command, e)))?;
        if !status.success() {
            return Err(ActionError::KeyTool(format!(
                "{} {} exited with {}",
                self.keys.command, name, status
            )));
        }
        Ok(())
    }

    fn player_alive(&mut self) -> bool {
        let Some(child) = self.player.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                if let Some(code) = status.code() {
                    info!("player exited with code: {}", code);
                } else {
                    info!("player terminated by signal");
                }
                self.player = None;
                false
            }
            Err(e) => {
                warn!("player liveness check failed: {}", e);
                self.player = None;
                false
            }
        }
    }
}
