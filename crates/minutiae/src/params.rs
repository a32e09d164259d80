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

//! Thresholds and control parameters of the minutiae pipeline.

/// Maximum number of minutiae detected in an image before further candidates are dropped.
pub const MAX_MINUTIAE: usize = 1000;

/// Detection and removal parameters.
///
/// `Default` carries the standard values tuned for 500 PPI images and 8-pixel map blocks.
#[derive(Debug, Clone)]
pub struct LfsParams {
    /// Pixel dimension of a map block.
    pub blocksize: usize,

    /// Pixel distance in X or Y within which two candidate minutiae are considered similar.
    pub max_minutia_delta: i32,

    /// Contours whose minimum angle exceeds this are not considered to contain minutiae.
    pub max_high_curve_theta: f64,

    /// Half the contour length extracted for a high-curvature candidate.
    pub high_curve_half_contour: usize,

    /// Loops must be longer than this to be searched for minutiae.
    pub min_loop_len: usize,

    /// A loop whose minimum cross distance is below this is tested for minutiae.
    pub min_loop_aspect_dist: f64,

    /// A loop whose max/min cross-distance ratio reaches this is tested for minutiae.
    pub min_loop_aspect_ratio: f64,

    /// Pixel distance within which minutia pairs are tested for islands, lakes, and hooks.
    pub max_rmtest_dist: i32,

    /// Maximum contour length traced when testing for hooks.
    pub max_hook_len: usize,

    /// Half the maximum contour length traced when testing for islands and lakes.
    pub max_half_loop: usize,

    /// Translation distance used when testing whether a minutia points at an invalid block.
    pub trans_dir_pix: i32,

    /// Maximum circumference of a loop qualifying as a small hole.
    pub small_loop_len: usize,

    /// Half the contour length extracted for side-minutia analysis.
    pub side_half_contour: usize,

    /// Margin in pixels within which a minutia neighbors the next block.
    pub inv_block_margin: i32,

    /// An invalid neighbor block with fewer valid 8-neighbors than this removes the minutia.
    pub rm_valid_nbr_min: usize,

    /// Pixel distance within which minutia pairs are tested for overlaps.
    pub max_overlap_dist: i32,

    /// Pixel distance under which overlap pairs are joined regardless of join direction.
    pub max_overlap_join_dist: i32,

    /// Contour steps to the first malformation measuring point.
    pub malformation_steps_1: usize,

    /// Contour steps to the second malformation measuring point.
    pub malformation_steps_2: usize,

    /// Minimum cross-distance ratio at the two measuring points for a normal feature.
    pub min_malformation_ratio: f64,

    /// Maximum cross distance at the outer measuring point in low-flow blocks.
    pub max_malformation_dist: f64,

    /// Translation off a feature tip used by the pore test.
    pub pores_trans_r: i32,

    /// Steps searched perpendicular to the feature direction for ridge edges.
    pub pores_perp_steps: usize,

    /// Contour steps to the forward pore measuring points.
    pub pores_steps_fwd: usize,

    /// Contour steps to the backward pore measuring points.
    pub pores_steps_bwd: usize,

    /// Squared distances below this are treated as zero by the pore test.
    pub pores_min_dist2: f64,

    /// Maximum squared-distance ratio for a feature to be flagged as a pore.
    pub pores_max_ratio: f64,

    /// Whether perimeter points are removed (set for partial images).
    pub remove_perimeter_pts: bool,

    /// Minutiae closer than this to a perimeter point are removed.
    pub min_pp_distance: f64,

    /// Maximum pixel-value transitions on a trajectory still considered a free path.
    pub max_trans: usize,
}

impl Default for LfsParams {
    fn default() -> Self {
        LfsParams {
            blocksize: 8,
            max_minutia_delta: 10,
            max_high_curve_theta: std::f64::consts::PI / 3.0,
            high_curve_half_contour: 14,
            min_loop_len: 20,
            min_loop_aspect_dist: 1.0,
            min_loop_aspect_ratio: 2.25,
            max_rmtest_dist: 16,
            max_hook_len: 30,
            max_half_loop: 30,
            trans_dir_pix: 4,
            small_loop_len: 15,
            side_half_contour: 7,
            inv_block_margin: 4,
            rm_valid_nbr_min: 7,
            max_overlap_dist: 8,
            max_overlap_join_dist: 6,
            malformation_steps_1: 10,
            malformation_steps_2: 20,
            min_malformation_ratio: 2.0,
            max_malformation_dist: 20.0,
            pores_trans_r: 3,
            pores_perp_steps: 12,
            pores_steps_fwd: 10,
            pores_steps_bwd: 8,
            pores_min_dist2: 0.5,
            pores_max_ratio: 2.25,
            remove_perimeter_pts: false,
            min_pp_distance: 10.0,
            max_trans: 2,
        }
    }
}
