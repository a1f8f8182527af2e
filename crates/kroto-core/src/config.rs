use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    errors::Error,
    executor::{BulkDeleteConfig, ExecutorConfig},
    lists::ListPaths,
    subscription::ChannelRequirement,
    Result,
};

/// Typed runtime configuration.
///
/// Environment variables win; `appsettings.json` fills in the bot token and
/// channel list when the environment leaves them unset.
#[derive(Clone, Debug)]
pub struct Config {
    pub bot_token: String,
    pub required_channels: Vec<ChannelRequirement>,
    pub list_paths: ListPaths,
    pub appsettings_path: PathBuf,

    // Behavior flags
    pub reply_notices: bool,
    pub notice_cleanup_delay: Option<Duration>,
    pub list_reload_interval: Option<Duration>,
    pub bulk_delete_concurrency: usize,
    pub audible_alerts: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AppSettings {
    #[serde(default)]
    bot_token: Option<String>,
    #[serde(default)]
    channels_id: Option<Vec<String>>,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup instead of the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        let appsettings_path = PathBuf::from(
            get("APPSETTINGS_PATH").unwrap_or_else(|| "Config/appsettings.json".to_string()),
        );
        let settings = load_appsettings(&appsettings_path);

        let bot_token = get("TELEGRAM_BOT_TOKEN")
            .or_else(|| settings.bot_token.clone().and_then(non_empty))
            .ok_or_else(|| {
                Error::Config(format!(
                    "TELEGRAM_BOT_TOKEN is not set and {} has no BotToken",
                    appsettings_path.display()
                ))
            })?;

        let required_channels = match get("REQUIRED_CHANNELS") {
            Some(csv) => ChannelRequirement::parse_csv(&csv),
            None => settings
                .channels_id
                .unwrap_or_default()
                .iter()
                .map(|raw| raw.trim())
                .filter(|raw| !raw.is_empty())
                .map(ChannelRequirement::parse)
                .collect(),
        };
        for channel in &required_channels {
            if let ChannelRequirement::Malformed(raw) = channel {
                warn!(
                    channel = %raw,
                    "required channel is malformed; every membership check against it fails"
                );
            }
        }

        let list_paths = ListPaths {
            spam: path_or(get("SPAM_LIST_PATH"), "Data/banword_list.txt"),
            deny: path_or(get("DENY_LIST_PATH"), "Data/banuser_list.txt"),
            allow: path_or(get("ALLOW_LIST_PATH"), "Data/whiteuser_list.txt"),
        };

        let reply_notices = get("REPLY_NOTICES")
            .map(|s| parse_bool(&s))
            .unwrap_or(true);
        let notice_cleanup_delay = millis_or_disabled(get("NOTICE_CLEANUP_DELAY_MS"), 5_000);
        let list_reload_interval = millis_or_disabled(get("LIST_RELOAD_INTERVAL_MS"), 5_000);
        let bulk_delete_concurrency = get("BULK_DELETE_CONCURRENCY")
            .and_then(|s| s.trim().parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(5);
        let audible_alerts = get("AUDIBLE_ALERTS")
            .map(|s| parse_bool(&s))
            .unwrap_or(true);

        Ok(Self {
            bot_token,
            required_channels,
            list_paths,
            appsettings_path,
            reply_notices,
            notice_cleanup_delay,
            list_reload_interval,
            bulk_delete_concurrency,
            audible_alerts,
        })
    }

    pub fn channels(&self) -> Arc<[ChannelRequirement]> {
        self.required_channels.clone().into()
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            reply_notices: self.reply_notices,
            cleanup_delay: self.notice_cleanup_delay,
            bulk: BulkDeleteConfig {
                concurrency: self.bulk_delete_concurrency,
                ..BulkDeleteConfig::default()
            },
            audible_alerts: self.audible_alerts,
        }
    }

    /// Startup banner: which channels gate posting and where lists live.
    pub fn log_summary(&self) {
        if self.required_channels.is_empty() {
            info!("no required channels configured; subscription gate is open");
        }
        for channel in &self.required_channels {
            info!(channel = %channel, "required channel");
        }
        info!(
            spam = %self.list_paths.spam.display(),
            deny = %self.list_paths.deny.display(),
            allow = %self.list_paths.allow.display(),
            reply_notices = self.reply_notices,
            "list files"
        );
    }
}

fn load_appsettings(path: &Path) -> AppSettings {
    let Ok(contents) = fs::read_to_string(path) else {
        return AppSettings::default();
    };
    match serde_json::from_str(&contents) {
        Ok(settings) => settings,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unreadable appsettings");
            AppSettings::default()
        }
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() || env::var_os(key).is_some() {
            continue;
        }

        let mut val = v.trim().to_string();
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// `0` disables; unparsable values fall back to the default.
fn millis_or_disabled(v: Option<String>, default_ms: u64) -> Option<Duration> {
    let ms = v
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(default_ms);
    (ms > 0).then(|| Duration::from_millis(ms))
}

fn path_or(v: Option<String>, default: &str) -> PathBuf {
    PathBuf::from(v.unwrap_or_else(|| default.to_string()))
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
