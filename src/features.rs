//! Kernel capability probing for the BTF features the marshaler can work around.

use std::fmt;
use std::str::FromStr;

use crate::btf::error::{BtfError, BtfResult};

/// Answers whether the kernel that will consume a BTF buffer supports a feature.
///
/// Each method returns `Ok(())` when the feature is available and
/// [`BtfError::Unsupported`] when it is not; any other error means the check
/// itself failed.
pub trait FeatureProbe {
    fn have_enum64(&self) -> BtfResult<()>;
    fn have_func_linkage(&self) -> BtfResult<()>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KernelVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl KernelVersion {
    pub const ENUM64: KernelVersion = KernelVersion::new(6, 0, 0);
    pub const FUNC_LINKAGE: KernelVersion = KernelVersion::new(5, 6, 0);

    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    fn require(&self, feature: &'static str, requires: KernelVersion) -> BtfResult<()> {
        if *self >= requires {
            Ok(())
        } else {
            log::debug!("{feature} needs kernel {requires}, running {self}");
            Err(BtfError::Unsupported { feature, requires })
        }
    }
}

impl fmt::Display for KernelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Parses a release string such as `6.1.0-13-amd64` or `5.15`.
impl FromStr for KernelVersion {
    type Err = BtfError;

    fn from_str(release: &str) -> Result<Self, Self::Err> {
        let invalid = || BtfError::InvalidRelease(release.to_owned());
        let numeric = release
            .split(|c: char| !(c.is_ascii_digit() || c == '.'))
            .next()
            .unwrap_or_default();
        let mut parts = numeric.split('.').filter(|part| !part.is_empty());
        let mut next = |required: bool| -> BtfResult<u32> {
            match parts.next() {
                Some(part) => part.parse().map_err(|_| invalid()),
                None if required => Err(invalid()),
                None => Ok(0),
            }
        };
        Ok(KernelVersion::new(next(true)?, next(true)?, next(false)?))
    }
}

impl FeatureProbe for KernelVersion {
    fn have_enum64(&self) -> BtfResult<()> {
        self.require("BTF_KIND_ENUM64", Self::ENUM64)
    }

    fn have_func_linkage(&self) -> BtfResult<()> {
        self.require("BTF_KIND_FUNC linkage", Self::FUNC_LINKAGE)
    }
}
