use chrono_tz::Tz;

use crate::config::ChannelConfig;
use crate::error::ConfigError;

/// Hours during which a channel may receive uploads, inclusive on both ends,
/// evaluated in `timezone`.
#[derive(Debug, Clone, PartialEq)]
pub struct PostingWindow {
    pub start_hour: u32,
    pub end_hour: u32,
    pub timezone: Tz,
    pub daily_quota: u32,
}

impl PostingWindow {
    pub fn contains_hour(&self, hour: u32) -> bool {
        hour >= self.start_hour && hour <= self.end_hour
    }
}

#[derive(Clone, Default, PartialEq)]
pub struct ChannelCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

impl ChannelCredentials {
    pub fn is_configured(&self) -> bool {
        !self.client_id.trim().is_empty()
            && !self.client_secret.trim().is_empty()
            && !self.refresh_token.trim().is_empty()
    }
}

// Secrets stay out of logs.
impl std::fmt::Debug for ChannelCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelCredentials")
            .field("client_id", &self.client_id)
            .field("configured", &self.is_configured())
            .finish_non_exhaustive()
    }
}

/// A configured upload destination: identity, credentials and schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelTarget {
    pub key: String,
    pub name: String,
    pub credentials: ChannelCredentials,
    pub window: Option<PostingWindow>,
}

impl ChannelTarget {
    pub fn from_config(config: &ChannelConfig) -> Result<Self, ConfigError> {
        let window = match &config.schedule {
            Some(schedule) => Some(PostingWindow {
                start_hour: schedule.start_hour,
                end_hour: schedule.end_hour,
                timezone: schedule
                    .timezone
                    .parse()
                    .map_err(|_| ConfigError::InvalidTimezone(schedule.timezone.clone()))?,
                daily_quota: schedule.posts_per_day,
            }),
            None => None,
        };
        let name = if config.name.trim().is_empty() {
            config.key.clone()
        } else {
            config.name.clone()
        };
        Ok(Self {
            key: config.key.clone(),
            name,
            credentials: ChannelCredentials {
                client_id: config.client_id.clone(),
                client_secret: config.client_secret.clone(),
                refresh_token: config.refresh_token.clone(),
            },
            window,
        })
    }

    pub fn daily_quota(&self) -> Option<u32> {
        self.window.as_ref().map(|w| w.daily_quota)
    }
}

pub fn channels_from_config(configs: &[ChannelConfig]) -> Result<Vec<ChannelTarget>, ConfigError> {
    configs.iter().map(ChannelTarget::from_config).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScheduleConfig;

    #[test]
    fn builds_target_with_window() {
        let config = ChannelConfig {
            key: "channel_1".into(),
            name: String::new(),
            client_id: "id".into(),
            client_secret: "secret".into(),
            refresh_token: "token".into(),
            schedule: Some(ScheduleConfig {
                posts_per_day: 10,
                start_hour: 6,
                end_hour: 22,
                timezone: "America/New_York".into(),
            }),
        };
        let target = ChannelTarget::from_config(&config).unwrap();
        assert_eq!(target.name, "channel_1");
        assert!(target.credentials.is_configured());
        let window = target.window.unwrap();
        assert_eq!(window.timezone, chrono_tz::America::New_York);
        assert!(window.contains_hour(6));
        assert!(window.contains_hour(22));
        assert!(!window.contains_hour(23));
        assert!(!window.contains_hour(5));
    }

    #[test]
    fn blank_credentials_are_not_configured() {
        let creds = ChannelCredentials {
            client_id: "id".into(),
            client_secret: " ".into(),
            refresh_token: "token".into(),
        };
        assert!(!creds.is_configured());
        assert!(!format!("{creds:?}").contains("token"));
    }
}
