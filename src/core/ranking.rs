//! Site ranking.
//!
//! Every country with a successful feasibility/diversity pair is expanded
//! into [`SITES_PER_COUNTRY`] synthetic site candidates whose scores decay by
//! a fixed step per index. The expansion is a placeholder for a real per-site
//! model and is kept behind [`SiteSeed::synthesize`] so it can be swapped out
//! without touching the ranking itself.

use crate::domain::model::SiteCandidate;

pub const SITES_PER_COUNTRY: usize = 3;
pub const DEFAULT_MAX_SITES: usize = 10;

pub const BASELINE_FEASIBILITY: f64 = 8.5;
pub const BASELINE_DIVERSITY: f64 = 7.8;
pub const BASELINE_AVAILABILITY: f64 = 8.0;

const FEASIBILITY_DECAY: f64 = 0.3;
const DIVERSITY_DECAY: f64 = 0.2;
const AVAILABILITY_DECAY: f64 = 0.1;

const STRENGTHS: [&str; 2] = ["Strong enrollment history", "Experienced research staff"];
const CHALLENGES: [&str; 2] = ["Limited parking", "Competition from other studies"];

/// 國家層級的分數，用來展開成站點候選
#[derive(Debug, Clone, PartialEq)]
pub struct SiteSeed {
    pub country: String,
    pub feasibility: f64,
    pub diversity: f64,
    pub availability: f64,
}

impl SiteSeed {
    pub fn new(country: impl Into<String>, feasibility: f64, diversity: f64) -> Self {
        Self {
            country: country.into(),
            feasibility,
            diversity,
            availability: BASELINE_AVAILABILITY,
        }
    }

    /// Expands the country into its site candidates, unranked.
    pub fn synthesize(&self) -> Vec<SiteCandidate> {
        (0..SITES_PER_COUNTRY)
            .map(|index| {
                let step = index as f64;
                let feasibility = clamp_score(self.feasibility - FEASIBILITY_DECAY * step);
                let diversity = clamp_score(self.diversity - DIVERSITY_DECAY * step);
                let availability = clamp_score(self.availability - AVAILABILITY_DECAY * step);
                let (strengths, challenges) = annotations(index);

                SiteCandidate {
                    site_id: format!("{}_SITE_{:03}", self.country, index + 1),
                    site_name: format!("{} Clinical Research Site {}", self.country, index + 1),
                    country: self.country.clone(),
                    feasibility_score: feasibility,
                    diversity_score: diversity,
                    data_availability_score: availability,
                    composite_score: composite_score(feasibility, diversity, availability),
                    overall_rank: 0,
                    strengths,
                    challenges,
                }
            })
            .collect()
    }
}

pub fn composite_score(feasibility: f64, diversity: f64, availability: f64) -> f64 {
    (feasibility + diversity + availability) / 3.0
}

fn clamp_score(score: f64) -> f64 {
    score.clamp(0.0, 10.0)
}

/// Presentation-only annotations keyed by the site's index in its country.
fn annotations(index: usize) -> (Vec<String>, Vec<String>) {
    let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    match index {
        0 => (owned(&STRENGTHS), Vec::new()),
        1 => (owned(&STRENGTHS[..1]), owned(&CHALLENGES[..1])),
        2 => (Vec::new(), owned(&CHALLENGES[1..])),
        _ => (Vec::new(), Vec::new()),
    }
}

/// Synthesizes candidates for every seed in order.
pub fn synthesize_candidates(seeds: &[SiteSeed]) -> Vec<SiteCandidate> {
    seeds.iter().flat_map(SiteSeed::synthesize).collect()
}

/// Sorts candidates by composite score (descending), assigns dense 1-based
/// ranks and keeps the first `max_sites`. The sort is stable, so ties keep
/// their insertion order: country order first, then index within country.
pub fn rank_sites(mut candidates: Vec<SiteCandidate>, max_sites: usize) -> Vec<SiteCandidate> {
    candidates.sort_by(|a, b| b.composite_score.total_cmp(&a.composite_score));

    for (position, candidate) in candidates.iter_mut().enumerate() {
        candidate.overall_rank = position as u32 + 1;
    }

    candidates.truncate(max_sites);
    candidates
}
