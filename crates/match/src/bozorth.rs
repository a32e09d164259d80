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

//! Pairwise-compatibility template matching.
//!
//! Every pair of minutiae within a template defines a relationship: the squared distance
//! between the two points and the two orientations relative to the joining line. Relative
//! measurements are invariant under translation and rotation, so a genuine match shows up as
//! a large set of probe/gallery relationship pairs that agree with each other, all implying
//! the same rotation between the two templates. The score is the size of the largest such
//! mutually consistent set.

use fprint_logger as log;

use crate::{Template, TemplateEntry};

/// Default match threshold: scores at or above it declare a match.
pub const DEFAULT_MATCH_THRESHOLD: u32 = 40;

/// Matching tunables.
///
/// `Default` carries the reference values; integrators may tighten or relax them per sensor.
#[derive(Debug, Clone)]
pub struct Tunables {
    /// Maximum pixel distance between two minutiae forming an intra-template pair.
    pub dm: i32,

    /// Maximum squared-distance difference between compatible pairs.
    pub fd: i64,

    /// Squared-distance difference below which pairs are compatible unconditionally.
    pub fdd: i64,

    /// Relative tolerance of the squared-distance comparison.
    pub tk: f64,

    /// Maximum squared difference (degrees squared) of the relative angles.
    pub txs: i64,

    /// Squared angle difference at or above which the comparison wrapped around the circle.
    pub ctxs: i64,

    /// Minimum number of distinct minutiae a consistent set must involve to score.
    pub mstr: usize,

    /// Minimum score reported as nonzero.
    pub mmstr: u32,

    /// Width in degrees of the rotation window a consistent set must fit in.
    pub wwim: i32,

    /// Capacity of the compatibility table.
    pub qq_size: usize,
}

impl Default for Tunables {
    fn default() -> Self {
        Tunables {
            dm: 125,
            fd: 5625,
            fdd: 500,
            tk: 0.05,
            txs: 121,
            ctxs: 121801,
            mstr: 3,
            mmstr: 8,
            wwim: 10,
            qq_size: 4000,
        }
    }
}

/// Adjusts an angle in degrees onto `(-180, 180]`.
pub(crate) fn iangle180(deg: i32) -> i32 {
    if deg > 180 {
        deg - 360
    } else if deg <= -180 {
        deg + 360
    } else {
        deg
    }
}

/// An intra-template relationship between two minutiae.
#[derive(Debug, Copy, Clone)]
struct PairEntry {
    /// Index of the first minutia.
    k: usize,

    /// Index of the second minutia.
    j: usize,

    /// Squared distance between the two points.
    dist2: i64,

    /// First minutia's orientation relative to the joining line, degrees.
    beta_k: i32,

    /// Second minutia's orientation relative to the joining line, degrees.
    beta_j: i32,

    /// Angle of the joining line, degrees.
    line: i32,
}

/// Builds the sorted relationship table of a template.
fn build_pairs(template: &Template, tunables: &Tunables) -> Vec<PairEntry> {
    let entries = template.entries();
    let dm2 = (tunables.dm as i64) * (tunables.dm as i64);
    let mut pairs = Vec::new();
    for k in 0 .. entries.len() {
        for j in k + 1 .. entries.len() {
            let (a, b) = (&entries[k], &entries[j]);
            let dx = (b.x - a.x) as i64;
            let dy = (b.y - a.y) as i64;
            let dist2 = dx * dx + dy * dy;
            if dist2 > dm2 {
                continue;
            }
            let line = line_angle(a, b);
            pairs.push(PairEntry {
                k,
                j,
                dist2,
                beta_k: iangle180(a.theta - line),
                beta_j: iangle180(b.theta - line),
                line,
            });
        }
    }
    pairs.sort_by_key(|p| (p.dist2, p.k, p.j));
    pairs.truncate(tunables.qq_size);
    pairs
}

/// Angle in degrees of the line joining two entries, on `(-180, 180]`.
fn line_angle(a: &TemplateEntry, b: &TemplateEntry) -> i32 {
    let dx = (b.x - a.x) as f64;
    let dy = (b.y - a.y) as f64;
    if dx == 0.0 && dy == 0.0 {
        return 0;
    }
    let deg = dy.atan2(dx).to_degrees();
    iangle180(if deg < 0.0 { (deg - 0.5) as i32 } else { (deg + 0.5) as i32 })
}

/// Whether the squared distances of two relationships are compatible.
fn distance_compatible(dp2: i64, dg2: i64, tunables: &Tunables) -> bool {
    let dz = (dp2 - dg2).abs();
    if dz > tunables.fd {
        return false;
    }
    if dz <= tunables.fdd {
        return true;
    }
    // Relative test: |dp2 - dg2| within 2*tk of the combined magnitude.
    (dz as f64) <= 2.0 * tunables.tk * (dp2 + dg2) as f64
}

/// Whether two relative angles are compatible, accounting for circle wraparound.
fn angle_compatible(a: i32, b: i32, tunables: &Tunables) -> bool {
    let dz = (a - b) as i64;
    let dz2 = dz * dz;
    dz2 <= tunables.txs || dz2 >= tunables.ctxs
}

/// A compatible probe/gallery relationship pair: two minutia correspondences plus the
/// rotation between the templates it implies.
#[derive(Debug, Copy, Clone)]
struct Association {
    /// Probe minutia mapped by the first correspondence.
    pk: usize,

    /// Gallery minutia the first correspondence maps to.
    gk: usize,

    /// Probe minutia mapped by the second correspondence.
    pj: usize,

    /// Gallery minutia the second correspondence maps to.
    gj: usize,

    /// Implied rotation from gallery to probe, degrees on `(-180, 180]`.
    rotation: i32,
}

/// Builds the table of compatible relationship pairs.
///
/// Both tables are sorted by squared distance, so candidates outside the distance tolerance
/// are skipped with a sliding lower bound instead of a full cross product.
fn build_associations(
    probe: &[PairEntry], gallery: &[PairEntry], tunables: &Tunables,
) -> Vec<Association> {
    let mut associations = Vec::new();
    let mut lo = 0;
    for p in probe {
        // Squared distances differing by more than fd can never be compatible.
        while lo < gallery.len() && gallery[lo].dist2 < p.dist2 - tunables.fd {
            lo += 1;
        }
        for g in &gallery[lo ..] {
            if g.dist2 > p.dist2 + tunables.fd {
                break;
            }
            if !distance_compatible(p.dist2, g.dist2, tunables) {
                continue;
            }
            // Straight correspondence: k maps to k, j to j.
            if angle_compatible(p.beta_k, g.beta_k, tunables)
                && angle_compatible(p.beta_j, g.beta_j, tunables)
            {
                associations.push(Association {
                    pk: p.k,
                    gk: g.k,
                    pj: p.j,
                    gj: g.j,
                    rotation: iangle180(p.line - g.line),
                });
            }
            // Crossed correspondence: reversing the gallery pair turns its joining line
            // around, shifting both relative angles by 180 degrees.
            let rev_k = iangle180(g.beta_j - 180);
            let rev_j = iangle180(g.beta_k - 180);
            if angle_compatible(p.beta_k, rev_k, tunables)
                && angle_compatible(p.beta_j, rev_j, tunables)
            {
                associations.push(Association {
                    pk: p.k,
                    gk: g.j,
                    pj: p.j,
                    gj: g.k,
                    rotation: iangle180(p.line - g.line - 180),
                });
            }
            if associations.len() >= tunables.qq_size {
                log::debug!("association table full");
                return associations;
            }
        }
    }
    associations
}

/// Largest mutually consistent association set within one rotation window.
///
/// Associations are admitted greedily in table order; one is consistent with the set when
/// both its correspondences agree with the one-to-one mapping accumulated so far. The score
/// is the number of admitted associations, zero unless at least
/// [`Tunables::mstr`] distinct probe minutiae are involved.
fn window_score(
    associations: &[Association], lo_rotation: i32, tunables: &Tunables,
    probe_len: usize, gallery_len: usize,
) -> u32 {
    let mut probe_map = vec![usize::MAX; probe_len];
    let mut gallery_map = vec![usize::MAX; gallery_len];
    let mut admitted = 0u32;
    let mut matched = 0usize;
    for a in associations {
        // Rotation distance from the window start, measured around the circle.
        if (a.rotation - lo_rotation).rem_euclid(360) > tunables.wwim {
            continue;
        }
        let mut consistent = true;
        for (p, g) in [(a.pk, a.gk), (a.pj, a.gj)] {
            if (probe_map[p] != usize::MAX && probe_map[p] != g)
                || (gallery_map[g] != usize::MAX && gallery_map[g] != p)
            {
                consistent = false;
            }
        }
        if !consistent {
            continue;
        }
        for (p, g) in [(a.pk, a.gk), (a.pj, a.gj)] {
            if probe_map[p] == usize::MAX {
                probe_map[p] = g;
                gallery_map[g] = p;
                matched += 1;
            }
        }
        admitted += 1;
    }
    if matched < tunables.mstr { 0 } else { admitted }
}

/// Computes the match score between a probe and a gallery template.
///
/// The score is a nonnegative integer growing with the size of the largest geometrically and
/// directionally consistent correspondence between the templates. Scores below
/// [`Tunables::mmstr`] are reported as zero.
pub fn match_score(probe: &Template, gallery: &Template, tunables: &Tunables) -> u32 {
    let probe_pairs = build_pairs(probe, tunables);
    let gallery_pairs = build_pairs(gallery, tunables);
    if probe_pairs.is_empty() || gallery_pairs.is_empty() {
        return 0;
    }
    let associations = build_associations(&probe_pairs, &gallery_pairs, tunables);

    let mut best = 0;
    let mut rotations: Vec<i32> = associations.iter().map(|a| a.rotation).collect();
    rotations.sort_unstable();
    rotations.dedup();
    for rotation in rotations {
        let score = window_score(&associations, rotation, tunables, probe.len(),
            gallery.len());
        best = best.max(score);
    }
    if best < tunables.mmstr {
        return 0;
    }
    log::debug!("match score {}", best);
    best
}

/// Scores a probe against a gallery of templates, short-circuiting on the first match.
///
/// Returns the index of the first template whose score meets the threshold.
pub fn search_gallery<'a>(
    probe: &Template, gallery: impl IntoIterator<Item = &'a Template>, threshold: u32,
    tunables: &Tunables,
) -> Option<usize> {
    for (i, candidate) in gallery.into_iter().enumerate() {
        if match_score(probe, candidate, tunables) >= threshold {
            return Some(i);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(points: &[(i32, i32, i32)]) -> Template {
        let entries = points
            .iter()
            .map(|&(x, y, theta)| TemplateEntry { x, y, theta, quality: 99 })
            .collect();
        Template::from_entries(entries).unwrap()
    }

    // Twelve minutiae spread over a 100x100 box with varied orientations.
    fn probe_points() -> Vec<(i32, i32, i32)> {
        vec![
            (10, 10, 90),
            (30, 12, -45),
            (55, 8, 180),
            (80, 15, 30),
            (12, 40, -120),
            (42, 38, 60),
            (70, 45, -90),
            (95, 40, 135),
            (15, 75, 0),
            (45, 80, -30),
            (72, 78, 115),
            (98, 85, -160),
        ]
    }

    #[test]
    fn self_match_meets_the_default_threshold() {
        let template = template(&probe_points());
        let score = match_score(&template, &template, &Tunables::default());
        assert!(score >= DEFAULT_MATCH_THRESHOLD, "self-match score {score}");
    }

    #[test]
    fn translation_is_irrelevant() {
        let probe = template(&probe_points());
        let shifted: Vec<_> =
            probe_points().iter().map(|&(x, y, t)| (x + 200, y + 310, t)).collect();
        let gallery = template(&shifted);
        let score = match_score(&probe, &gallery, &Tunables::default());
        assert!(score >= DEFAULT_MATCH_THRESHOLD, "translated score {score}");
    }

    #[test]
    fn unrelated_geometry_scores_low() {
        let probe = template(&probe_points());
        // A sparse diagonal line with aligned orientations shares no pair structure.
        let gallery = template(&[
            (5, 5, 0),
            (45, 45, 10),
            (85, 85, 20),
            (125, 125, 30),
            (165, 165, 40),
        ]);
        let score = match_score(&probe, &gallery, &Tunables::default());
        assert!(score < DEFAULT_MATCH_THRESHOLD, "unrelated score {score}");
    }

    #[test]
    fn empty_templates_score_zero() {
        let empty = Template::default();
        let probe = template(&probe_points());
        assert_eq!(match_score(&probe, &empty, &Tunables::default()), 0);
        assert_eq!(match_score(&empty, &empty, &Tunables::default()), 0);
    }

    #[test]
    fn gallery_search_short_circuits_on_first_match() {
        let probe = template(&probe_points());
        let other = template(&[(5, 5, 0), (45, 45, 10), (85, 85, 20)]);
        let gallery = vec![other, probe.clone(), probe.clone()];
        let found =
            search_gallery(&probe, &gallery, DEFAULT_MATCH_THRESHOLD, &Tunables::default());
        assert_eq!(found, Some(1));
    }
}
