// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Minutiae templates and template matching.
//!
//! A template is the compact, matching-ready encoding of a pruned minutiae list: at most
//! [`MAX_TEMPLATE_MINUTIAE`] entries of pixel coordinates, orientation in degrees, and
//! reliability in percent, sorted ascending by coordinates. Matching is scored by the
//! pairwise-compatibility algorithm in [`bozorth`].

use fprint_error::{Code, Error};
use fprint_minutiae::{Minutiae, NDIRS};

pub mod bozorth;

pub use bozorth::{DEFAULT_MATCH_THRESHOLD, Tunables, match_score};

/// Maximum number of minutiae encoded into a template.
pub const MAX_TEMPLATE_MINUTIAE: usize = 150;

/// One encoded minutia.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TemplateEntry {
    /// X pixel coordinate.
    pub x: i32,

    /// Y pixel coordinate.
    pub y: i32,

    /// Orientation in degrees on `(-180, 180]`.
    pub theta: i32,

    /// Reliability scaled to percent.
    pub quality: i32,
}

/// A matching-ready minutiae template.
///
/// Entries are sorted non-strictly ascending by `(x, y)` and hold no two identical
/// coordinates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Template {
    entries: Vec<TemplateEntry>,
}

/// Rounds half away from zero.
fn sround(x: f64) -> i32 {
    if x < 0.0 { (x - 0.5) as i32 } else { (x + 0.5) as i32 }
}

impl Template {
    /// Encodes a pruned minutiae list.
    ///
    /// When the list holds more than [`MAX_TEMPLATE_MINUTIAE`] entries, the most reliable
    /// ones are kept, breaking ties in favor of earlier list positions. The orientation is
    /// the internal direction scaled to degrees and mapped onto `(-180, 180]`.
    pub fn from_minutiae(minutiae: &Minutiae) -> Self {
        let mut order: Vec<usize> = (0 .. minutiae.len()).collect();
        // sort_by is stable: equal qualities keep their list order.
        order.sort_by(|&a, &b| {
            minutiae.0[b].reliability.partial_cmp(&minutiae.0[a].reliability).unwrap()
        });
        order.truncate(MAX_TEMPLATE_MINUTIAE);

        let mut entries: Vec<TemplateEntry> = order
            .into_iter()
            .map(|i| {
                let m = &minutiae.0[i];
                let mut theta = sround(m.direction.value() as f64 * 180.0 / NDIRS as f64);
                if theta > 180 {
                    theta -= 360;
                }
                TemplateEntry {
                    x: m.x,
                    y: m.y,
                    theta,
                    quality: sround(m.reliability * 100.0),
                }
            })
            .collect();
        entries.sort_by_key(|e| (e.x, e.y));
        entries.dedup_by_key(|e| (e.x, e.y));
        Template { entries }
    }

    /// Builds a template from raw entries (sorting and deduplicating them).
    pub fn from_entries(mut entries: Vec<TemplateEntry>) -> Result<Self, Error> {
        Error::user(Code::InvalidLength).check(entries.len() <= MAX_TEMPLATE_MINUTIAE)?;
        entries.sort_by_key(|e| (e.x, e.y));
        entries.dedup_by_key(|e| (e.x, e.y));
        Ok(Template { entries })
    }

    /// The encoded entries, ascending by `(x, y)`.
    pub fn entries(&self) -> &[TemplateEntry] {
        &self.entries
    }

    /// Number of encoded minutiae.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the template is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Renders the entries in the interchange convention.
    ///
    /// Interchange records use a bottom-left origin (`y' = height - y`) and orientation
    /// `(270 - theta) mod 360` degrees, counter-clockwise from east.
    pub fn interchange_records(&self, height: i32) -> Vec<(i32, i32, i32, i32)> {
        self.entries
            .iter()
            .map(|e| {
                let t = (270 - e.theta).rem_euclid(360);
                (e.x, height - e.y, t, e.quality)
            })
            .collect()
    }

    /// Serializes the template to its little-endian wire form.
    ///
    /// The layout is a `u32` entry count followed by one `(i32 x, i32 y, i32 theta,
    /// i32 quality)` record per entry, every field little-endian.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + 16 * self.entries.len());
        out.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for e in &self.entries {
            out.extend_from_slice(&e.x.to_le_bytes());
            out.extend_from_slice(&e.y.to_le_bytes());
            out.extend_from_slice(&e.theta.to_le_bytes());
            out.extend_from_slice(&e.quality.to_le_bytes());
        }
        out
    }

    /// Parses a template from its little-endian wire form.
    pub fn parse(data: &[u8]) -> Result<Self, Error> {
        let error = Error::user(Code::InvalidLength);
        error.check(data.len() >= 4)?;
        let count = u32::from_le_bytes(data[.. 4].try_into().unwrap()) as usize;
        error.check(count <= MAX_TEMPLATE_MINUTIAE)?;
        error.check(data.len() == 4 + 16 * count)?;
        let mut entries = Vec::with_capacity(count);
        for record in data[4 ..].chunks_exact(16) {
            let field = |i: usize| {
                i32::from_le_bytes(record[4 * i .. 4 * (i + 1)].try_into().unwrap())
            };
            let theta = field(2);
            Error::user(Code::InvalidArgument).check(-180 < theta && theta <= 180)?;
            entries.push(TemplateEntry { x: field(0), y: field(1), theta, quality: field(3) });
        }
        Ok(Template { entries })
    }
}

#[cfg(test)]
mod tests {
    use fprint_minutiae::{FullDir, HIGH_RELIABILITY, Minutia, MinutiaKind};

    use super::*;

    fn minutia(x: i32, y: i32, dir: u8) -> Minutia {
        Minutia {
            x,
            y,
            ex: x,
            ey: y - 1,
            direction: FullDir::new(dir),
            reliability: HIGH_RELIABILITY,
            kind: MinutiaKind::RidgeEnding,
            appearing: true,
            feature_id: 0,
            neighbors: None,
        }
    }

    #[test]
    fn entries_are_sorted_and_deduplicated() {
        let minutiae = Minutiae(vec![
            minutia(10, 5, 0),
            minutia(3, 9, 0),
            minutia(10, 4, 0),
            minutia(3, 9, 0),
        ]);
        let template = Template::from_minutiae(&minutiae);
        let coords: Vec<_> = template.entries().iter().map(|e| (e.x, e.y)).collect();
        assert_eq!(coords, [(3, 9), (10, 4), (10, 5)]);
    }

    #[test]
    fn theta_lands_in_the_half_open_degree_range() {
        // Direction 16 is 180 degrees and stays; direction 24 is 270 and wraps to -90.
        let minutiae = Minutiae(vec![minutia(1, 1, 16), minutia(2, 2, 24)]);
        let template = Template::from_minutiae(&minutiae);
        assert_eq!(template.entries()[0].theta, 180);
        assert_eq!(template.entries()[1].theta, -90);
    }

    #[test]
    fn excess_minutiae_are_dropped_in_quality_order() {
        let mut list = Vec::new();
        for i in 0 .. 200 {
            let mut m = minutia(i, i, 0);
            // The first 60 entries are medium quality, the rest high.
            if i < 60 {
                m.reliability = 0.50;
            }
            list.push(m);
        }
        let template = Template::from_minutiae(&Minutiae(list));
        assert_eq!(template.len(), MAX_TEMPLATE_MINUTIAE);
        let high = template.entries().iter().filter(|e| e.quality == 99).count();
        // All 140 high-reliability minutiae survive, filled up with 10 medium ones.
        assert_eq!(high, 140);
    }

    #[test]
    fn wire_form_round_trips() {
        let minutiae = Minutiae(vec![minutia(7, 3, 5), minutia(40, 20, 19)]);
        let template = Template::from_minutiae(&minutiae);
        let parsed = Template::parse(&template.serialize()).unwrap();
        assert_eq!(parsed, template);
    }

    #[test]
    fn truncated_wire_form_is_rejected() {
        let minutiae = Minutiae(vec![minutia(7, 3, 5)]);
        let bytes = template_bytes(&minutiae);
        assert!(Template::parse(&bytes[.. bytes.len() - 1]).is_err());
        assert!(Template::parse(&[]).is_err());
    }

    fn template_bytes(minutiae: &Minutiae) -> Vec<u8> {
        Template::from_minutiae(minutiae).serialize()
    }

    #[test]
    fn interchange_flips_y_and_rotates_theta() {
        let minutiae = Minutiae(vec![minutia(4, 10, 0)]);
        let template = Template::from_minutiae(&minutiae);
        let records = template.interchange_records(32);
        assert_eq!(records, [(4, 22, 270, 99)]);
    }
}
