//! Quality selection for a play request.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::catalog::QualityOption;

/// Resolution at which 4K begins.
pub const UHD_RESOLUTION: u32 = 2160;

/// Which quality a play request picks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityPolicy {
    /// Exclusive upper bound on the vertical resolution.
    pub ceiling: u32,
    /// Lifts the ceiling entirely.
    pub allow_4k: bool,
}

impl Default for QualityPolicy {
    fn default() -> Self {
        Self {
            ceiling: UHD_RESOLUTION,
            allow_4k: false,
        }
    }
}

impl QualityPolicy {
    fn accepts(&self, resolution: u32) -> bool {
        self.allow_4k || resolution < self.ceiling
    }

    /// Pick the best acceptable option.
    ///
    /// Options are ranked by parsed resolution, highest first; among equal
    /// resolutions the one listed later by the catalog wins.  Labels without a
    /// resolution token (e.g. `3D.BluRay`) are skipped.  Returns `None` when
    /// nothing passes the ceiling.
    pub fn select<'a>(&self, options: &'a [QualityOption]) -> Option<&'a QualityOption> {
        let re = Regex::new(r"(?i)^\s*(\d{3,4})p").ok()?;

        let mut ranked: Vec<(u32, &QualityOption)> = options
            .iter()
            .rev()
            .filter_map(|opt| resolution_of(&re, &opt.label).map(|res| (res, opt)))
            .collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0));

        ranked
            .into_iter()
            .find(|(res, _)| self.accepts(*res))
            .map(|(_, opt)| opt)
    }
}

fn resolution_of(re: &Regex, label: &str) -> Option<u32> {
    re.captures(label)?.get(1)?.as_str().parse().ok()
}

/// Parse the resolution token of a quality label (`"1080p.WEB"` → 1080).
pub fn parse_resolution(label: &str) -> Option<u32> {
    let re = Regex::new(r"(?i)^\s*(\d{3,4})p").ok()?;
    resolution_of(&re, label)
}
