//! Quota profiles and the named profile catalog.

use std::collections::BTreeMap;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of the profile every student receives regardless of enrollment.
pub const BASELINE_PROFILE: &str = "basic";

/// Name of the alternative template. Never part of reconciliation.
pub const LAB_PROFILE: &str = "lab";

/// A bundle of eight independent resource limits.
///
/// Used both as a course's contribution and as a student's computed
/// entitlement. Fields add independently; there is no cap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaProfile {
    pub instances: u64,
    pub cores: u64,
    #[serde(rename = "ramMB")]
    pub ram_mb: u64,
    pub volumes: u64,
    pub gigabytes: u64,
    pub ports: u64,
    #[serde(rename = "floatingIPs")]
    pub floating_ips: u64,
    pub snapshots: u64,
}

impl QuotaProfile {
    /// Largest limit a remote quota service accepts for one field.
    ///
    /// Remote quota sets are 32-bit signed; bounding every stored profile
    /// keeps entitlement sums far from `u64` overflow.
    pub const MAX_LIMIT: u64 = i32::MAX as u64;

    /// All-zero profile; the additive identity.
    pub const ZERO: Self = Self {
        instances: 0,
        cores: 0,
        ram_mb: 0,
        volumes: 0,
        gigabytes: 0,
        ports: 0,
        floating_ips: 0,
        snapshots: 0,
    };

    /// The built-in `basic` template.
    pub const fn basic() -> Self {
        Self {
            instances: 10,
            cores: 8,
            ram_mb: 16384,
            volumes: 10,
            gigabytes: 100,
            ports: 10,
            floating_ips: 5,
            snapshots: 10,
        }
    }

    /// The built-in `lab` template.
    pub const fn lab() -> Self {
        Self {
            instances: 20,
            cores: 16,
            ram_mb: 32768,
            volumes: 20,
            gigabytes: 200,
            ports: 20,
            floating_ips: 10,
            snapshots: 20,
        }
    }
}

impl QuotaProfile {
    /// Field names and values, in JSON naming.
    pub fn fields(&self) -> [(&'static str, u64); 8] {
        [
            ("instances", self.instances),
            ("cores", self.cores),
            ("ramMB", self.ram_mb),
            ("volumes", self.volumes),
            ("gigabytes", self.gigabytes),
            ("ports", self.ports),
            ("floatingIPs", self.floating_ips),
            ("snapshots", self.snapshots),
        ]
    }

    /// The first field above [`Self::MAX_LIMIT`], if any.
    pub fn out_of_range(&self) -> Option<(&'static str, u64)> {
        self.fields()
            .into_iter()
            .find(|&(_, value)| value > Self::MAX_LIMIT)
    }
}

impl Add for QuotaProfile {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl AddAssign for QuotaProfile {
    fn add_assign(&mut self, rhs: Self) {
        self.instances += rhs.instances;
        self.cores += rhs.cores;
        self.ram_mb += rhs.ram_mb;
        self.volumes += rhs.volumes;
        self.gigabytes += rhs.gigabytes;
        self.ports += rhs.ports;
        self.floating_ips += rhs.floating_ips;
        self.snapshots += rhs.snapshots;
    }
}

impl Sum for QuotaProfile {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a QuotaProfile> for QuotaProfile {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

/// Errors loading a profile catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog document is not valid TOML or has the wrong shape.
    #[error("invalid profile catalog: {0}")]
    Parse(#[from] toml::de::Error),

    /// The catalog does not define the baseline profile.
    #[error("profile catalog must define a 'basic' profile")]
    MissingBaseline,

    #[error("profile '{profile}' sets {field} = {value}, above the limit of {max}", max = QuotaProfile::MAX_LIMIT)]
    OutOfRange {
        profile: String,
        field: &'static str,
        value: u64,
    },
}

/// Named quota profile templates.
///
/// Loaded once at process start and passed explicitly to whoever needs it.
/// Names are case-insensitive. A catalog always contains the baseline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileCatalog {
    profiles: BTreeMap<String, QuotaProfile>,
    baseline: QuotaProfile,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    profiles: BTreeMap<String, QuotaProfile>,
}

impl ProfileCatalog {
    /// The built-in catalog: `basic` and `lab`.
    pub fn builtin() -> Self {
        let profiles = BTreeMap::from([
            (BASELINE_PROFILE.to_string(), QuotaProfile::basic()),
            (LAB_PROFILE.to_string(), QuotaProfile::lab()),
        ]);
        Self {
            profiles,
            baseline: QuotaProfile::basic(),
        }
    }

    /// Build a catalog from explicit entries.
    pub fn from_profiles<I, S>(entries: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = (S, QuotaProfile)>,
        S: AsRef<str>,
    {
        let profiles: BTreeMap<String, QuotaProfile> = entries
            .into_iter()
            .map(|(name, profile)| (name.as_ref().trim().to_lowercase(), profile))
            .collect();

        for (name, profile) in &profiles {
            if let Some((field, value)) = profile.out_of_range() {
                return Err(CatalogError::OutOfRange {
                    profile: name.clone(),
                    field,
                    value,
                });
            }
        }

        let baseline = *profiles
            .get(BASELINE_PROFILE)
            .ok_or(CatalogError::MissingBaseline)?;

        Ok(Self { profiles, baseline })
    }

    /// Parse a TOML catalog document.
    ///
    /// ```toml
    /// [profiles.basic]
    /// cores = 8
    /// ramMB = 16384
    /// ```
    pub fn from_toml_str(doc: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(doc)?;
        Self::from_profiles(file.profiles)
    }

    /// Look up a profile by name.
    pub fn get(&self, name: &str) -> Option<QuotaProfile> {
        self.profiles.get(&name.trim().to_lowercase()).copied()
    }

    /// The baseline profile assigned to every student.
    pub fn baseline(&self) -> QuotaProfile {
        self.baseline
    }

    /// Profile names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }
}

impl Default for ProfileCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
