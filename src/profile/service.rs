//! Profile resolution backends
//!
//! [`HttpProfileService`] talks to an input-profiles asset host (single
//! attempt, no retry). [`StaticProfileService`] serves bundled profiles for
//! offline operation and tests. Both pick the first profile id the device
//! advertises and fall back to a configured default id.

use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::device::InputSourceDescriptor;
use crate::profile::{InputProfile, ProfileError};

/// Profile id used when a descriptor advertises nothing usable.
pub const DEFAULT_PROFILE_ID: &str = "generic-trigger-squeeze-touchpad-thumbstick";

/// Layout served by [`StaticProfileService::bundled`]. Mirrors the generic
/// registry profile: trigger, squeeze, touchpad and thumbstick.
const BUNDLED_GENERIC_PROFILE: &str = r#"{
    "profileId": "generic-trigger-squeeze-touchpad-thumbstick",
    "layouts": {
        "left-right": {
            "components": {
                "xr-standard-trigger": {
                    "rootNodeName": "xr_standard_trigger",
                    "gamepadIndices": { "button": 0 }
                },
                "xr-standard-squeeze": {
                    "rootNodeName": "xr_standard_squeeze",
                    "gamepadIndices": { "button": 1 }
                },
                "xr-standard-touchpad": {
                    "rootNodeName": "xr_standard_touchpad",
                    "gamepadIndices": { "button": 2, "xAxis": 0, "yAxis": 1 }
                },
                "xr-standard-thumbstick": {
                    "rootNodeName": "xr_standard_thumbstick",
                    "gamepadIndices": { "button": 3, "xAxis": 2, "yAxis": 3 }
                }
            }
        }
    }
}"#;

/// Source of input profile descriptions for connected devices.
#[async_trait]
pub trait ProfileService: Send + Sync {
    async fn fetch_profile(
        &self,
        descriptor: &InputSourceDescriptor,
    ) -> Result<InputProfile, ProfileError>;
}

fn requested_profile_id<'a>(descriptor: &'a InputSourceDescriptor, default_id: &'a str) -> &'a str {
    descriptor
        .profiles
        .first()
        .map(String::as_str)
        .unwrap_or(default_id)
}

/// Fetches profiles from an input-profiles asset host over HTTP.
///
/// One attempt per connect, no retry. A failed fetch leaves the device
/// registered but inert; the registry logs and degrades instead of crashing.
pub struct HttpProfileService {
    client: reqwest::Client,
    base_url: String,
    default_profile_id: String,
}

impl HttpProfileService {
    pub fn new(base_url: &str, default_profile_id: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            default_profile_id: default_profile_id.to_string(),
        }
    }
}

#[async_trait]
impl ProfileService for HttpProfileService {
    async fn fetch_profile(
        &self,
        descriptor: &InputSourceDescriptor,
    ) -> Result<InputProfile, ProfileError> {
        let profile_id = requested_profile_id(descriptor, &self.default_profile_id);
        let url = format!("{}/{}/profile.json", self.base_url, profile_id);
        debug!("Fetching input profile from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProfileError::Fetch(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ProfileError::Fetch(format!(
                "{} answered {}",
                url,
                response.status()
            )));
        }

        let profile = response
            .json::<InputProfile>()
            .await
            .map_err(|e| ProfileError::Fetch(e.to_string()))?;
        info!("Resolved input profile {}", profile.profile_id);
        Ok(profile)
    }
}

/// Serves profiles from memory. Used by the scripted demo and in tests.
pub struct StaticProfileService {
    profiles: HashMap<String, InputProfile>,
    default_profile_id: String,
}

impl StaticProfileService {
    pub fn new(default_profile_id: &str) -> Self {
        Self {
            profiles: HashMap::new(),
            default_profile_id: default_profile_id.to_string(),
        }
    }

    /// A service preloaded with the generic trigger/squeeze/touchpad/thumbstick
    /// profile as its default.
    pub fn bundled() -> Result<Self, ProfileError> {
        let mut service = Self::new(DEFAULT_PROFILE_ID);
        service.insert(serde_json::from_str(BUNDLED_GENERIC_PROFILE)?);
        Ok(service)
    }

    pub fn insert(&mut self, profile: InputProfile) {
        self.profiles.insert(profile.profile_id.clone(), profile);
    }
}

#[async_trait]
impl ProfileService for StaticProfileService {
    async fn fetch_profile(
        &self,
        descriptor: &InputSourceDescriptor,
    ) -> Result<InputProfile, ProfileError> {
        let profile_id = requested_profile_id(descriptor, &self.default_profile_id);
        let profile = self
            .profiles
            .get(profile_id)
            .or_else(|| self.profiles.get(&self.default_profile_id))
            .ok_or_else(|| {
                ProfileError::Fetch(format!("no bundled profile for {profile_id}"))
            })?;
        debug!("Serving bundled input profile {}", profile.profile_id);
        Ok(profile.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Handedness;
    use crate::profile::ControlLayout;

    #[tokio::test]
    async fn bundled_profile_resolves_for_both_hands() {
        let service = StaticProfileService::bundled().unwrap();
        let descriptor = InputSourceDescriptor::new(Handedness::Left, &[]);
        let profile = service.fetch_profile(&descriptor).await.unwrap();
        assert_eq!(profile.profile_id, DEFAULT_PROFILE_ID);

        for handedness in [Handedness::Right, Handedness::Left] {
            let layout = ControlLayout::from_profile(&profile, handedness).unwrap();
            assert_eq!(layout.len(), 4);
        }
    }

    #[tokio::test]
    async fn unknown_id_falls_back_to_default() {
        let service = StaticProfileService::bundled().unwrap();
        let descriptor =
            InputSourceDescriptor::new(Handedness::Right, &["oculus-touch-v3".to_string()]);
        let profile = service.fetch_profile(&descriptor).await.unwrap();
        assert_eq!(profile.profile_id, DEFAULT_PROFILE_ID);
    }

    #[tokio::test]
    async fn empty_service_reports_fetch_failure() {
        let service = StaticProfileService::new("missing");
        let descriptor = InputSourceDescriptor::new(Handedness::Right, &[]);
        let err = service.fetch_profile(&descriptor).await.unwrap_err();
        assert!(matches!(err, ProfileError::Fetch(_)));
    }
}
