//! Build requests and their canonical form.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Location of an image in the catalog: distribution, release, target and subtarget.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetCoords {
    pub distro: String,
    pub release: String,
    pub target: String,
    pub subtarget: String,
}

impl TargetCoords {
    pub fn new(
        distro: impl Into<String>,
        release: impl Into<String>,
        target: impl Into<String>,
        subtarget: impl Into<String>,
    ) -> Self {
        Self {
            distro: distro.into(),
            release: release.into(),
            target: target.into(),
            subtarget: subtarget.into(),
        }
    }
}

/// An image build request as submitted by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    pub distro: String,
    pub release: String,
    pub target: String,
    pub subtarget: String,
    pub profile: String,
    #[serde(default)]
    pub packages: Vec<String>,
    #[serde(default)]
    pub network_profile: String,
}

impl BuildRequest {
    /// Validate the request and bring it into canonical form.
    pub fn normalize(&self) -> Result<NormalizedRequest> {
        let mut packages = Vec::with_capacity(self.packages.len());
        for package in &self.packages {
            packages.push(required_token("packages", package)?);
        }
        packages.sort();
        packages.dedup();

        Ok(NormalizedRequest {
            coords: TargetCoords {
                distro: required_token("distro", &self.distro)?,
                release: required_token("release", &self.release)?,
                target: required_token("target", &self.target)?,
                subtarget: required_token("subtarget", &self.subtarget)?,
            },
            profile: required_token("profile", &self.profile)?,
            packages,
            network_profile: optional_token("network_profile", &self.network_profile)?,
        })
    }
}

/// A validated build request with sorted, deduplicated packages.
///
/// Two requests that normalize to equal values describe the same image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct NormalizedRequest {
    coords: TargetCoords,
    profile: String,
    packages: Vec<String>,
    network_profile: String,
}

impl NormalizedRequest {
    pub fn coords(&self) -> &TargetCoords {
        &self.coords
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn packages(&self) -> &[String] {
        &self.packages
    }

    pub fn network_profile(&self) -> &str {
        &self.network_profile
    }

    /// Package list as stored in the queue table.
    pub fn packages_joined(&self) -> String {
        self.packages.join(" ")
    }

    /// Space separated text the fingerprint is computed from.
    ///
    /// No field may contain whitespace and the network profile is always the
    /// last token, so distinct requests never share a canonical text.
    pub fn canonical_text(&self) -> String {
        let mut parts = vec![
            self.coords.distro.as_str(),
            self.coords.release.as_str(),
            self.coords.target.as_str(),
            self.coords.subtarget.as_str(),
            self.profile.as_str(),
        ];
        parts.extend(self.packages.iter().map(String::as_str));
        parts.push(self.network_profile.as_str());
        parts.join(" ")
    }
}

fn required_token(field: &'static str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::InvalidRequest {
            field,
            reason: "must not be empty".to_string(),
        });
    }
    optional_token(field, value)
}

fn optional_token(field: &'static str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.chars().any(char::is_whitespace) {
        return Err(Error::InvalidRequest {
            field,
            reason: format!("must not contain whitespace: {:?}", value),
        });
    }
    Ok(value.to_string())
}
