use anyhow::{anyhow, Context, Result};
use semver::Version;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum VersionRequest {
    #[default]
    Current,
    Latest,
    Exact(Version),
}

impl FromStr for VersionRequest {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("latest") {
            return Ok(Self::Latest);
        }
        let raw = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let version = Version::parse(raw)
            .with_context(|| format!("invalid version '{value}': expected X.Y.Z or 'latest'"))?;
        Ok(Self::Exact(version))
    }
}

impl fmt::Display for VersionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Current => f.write_str("current"),
            Self::Latest => f.write_str("latest"),
            Self::Exact(version) => write!(f, "{version}"),
        }
    }
}

pub trait VersionResolver {
    fn current(&self) -> Option<Version>;

    fn latest(&self) -> Result<Version>;
}

/// Resolver backed by known versions. Release lookup over the network lives
/// outside the engine, so `latest` resolves to whatever the caller supplies.
#[derive(Debug, Clone, Default)]
pub struct StaticVersionResolver {
    current: Option<Version>,
    latest: Option<Version>,
}

impl StaticVersionResolver {
    pub fn new(current: Option<Version>, latest: Option<Version>) -> Self {
        Self { current, latest }
    }

    /// Uses the binary's own version for both current and latest. Pre-release
    /// builds (`-dev`, `-dirty`) count as development builds.
    pub fn for_binary(version: &str) -> Self {
        let current = Version::parse(version)
            .ok()
            .filter(|version| version.pre.is_empty());
        Self {
            latest: current.clone(),
            current,
        }
    }
}

impl VersionResolver for StaticVersionResolver {
    fn current(&self) -> Option<Version> {
        self.current.clone()
    }

    fn latest(&self) -> Result<Version> {
        self.latest
            .clone()
            .ok_or_else(|| anyhow!("latest release version is unknown for this build"))
    }
}

pub fn resolve_target_version(
    resolver: &dyn VersionResolver,
    request: &VersionRequest,
) -> Result<Option<Version>> {
    match request {
        VersionRequest::Current => Ok(resolver.current()),
        VersionRequest::Latest => resolver.latest().map(Some),
        VersionRequest::Exact(version) => {
            if let Some(current) = resolver.current() {
                if &current != version {
                    return Err(anyhow!(
                        "requested version {version} does not match the templates shipped by this binary ({current}); install al {version} and rerun"
                    ));
                }
            }
            Ok(Some(version.clone()))
        }
    }
}
