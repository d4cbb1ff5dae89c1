//! Diversification allocator.
//!
//! Turns a ranked candidate list into the ideal selection of `top_n`
//! securities under one of:
//! - score bands: capped admissions per score range, highest range first
//! - sector allocation: proportional slots per sector
//! - sector max count: a hard cap per sector
//! - plain: the first `top_n`
//!
//! The returned selection keeps the global rank order.

use std::collections::{BTreeSet, HashMap};

use crate::domain::config::{Diversification, ScoreBand, SectorCaps, Selection};
use crate::domain::screening::Candidate;

pub fn select(
    candidates: &[Candidate],
    selection: &Selection,
    diversification: Option<&Diversification>,
) -> Vec<Candidate> {
    let top_n = selection.top_n;
    let chosen = match (&selection.score_bands, diversification) {
        (Some(bands), _) if !bands.is_empty() => by_score_bands(candidates, bands, top_n),
        (_, Some(Diversification::Allocation { sector_allocation })) => {
            let allocation: Vec<(&str, f64)> = sector_allocation
                .iter()
                .map(|(sector, pct)| (sector.as_str(), *pct))
                .collect();
            by_allocation(candidates, &allocation, top_n)
        }
        (_, Some(Diversification::MaxCount {
            max_count_per_sector,
        })) => by_max_count(candidates, max_count_per_sector, top_n),
        _ => (0..candidates.len().min(top_n)).collect(),
    };
    chosen.into_iter().map(|i| candidates[i].clone()).collect()
}

fn by_score_bands(candidates: &[Candidate], bands: &[ScoreBand], top_n: usize) -> BTreeSet<usize> {
    let mut ordered: Vec<&ScoreBand> = bands.iter().collect();
    ordered.sort_by(|a, b| b.min.total_cmp(&a.min));

    let mut chosen = BTreeSet::new();
    for band in ordered {
        let mut admitted = 0;
        for (i, candidate) in candidates.iter().enumerate() {
            if chosen.len() >= top_n || admitted >= band.max_count {
                break;
            }
            if band.contains(candidate.score) && chosen.insert(i) {
                admitted += 1;
            }
        }
    }
    fill_remaining(&mut chosen, candidates.len(), top_n);
    chosen
}

fn by_allocation(candidates: &[Candidate], allocation: &[(&str, f64)], top_n: usize) -> BTreeSet<usize> {
    let mut chosen = BTreeSet::new();
    for (sector, pct) in allocation {
        let slots = (top_n as f64 * pct / 100.0).floor() as usize;
        let members = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| c.security.sector_or_unclassified().eq_ignore_ascii_case(sector))
            .map(|(i, _)| i)
            .take(slots);
        chosen.extend(members);
    }
    fill_remaining(&mut chosen, candidates.len(), top_n);
    chosen
}

fn by_max_count(candidates: &[Candidate], caps: &SectorCaps, top_n: usize) -> BTreeSet<usize> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut chosen = BTreeSet::new();
    for (i, candidate) in candidates.iter().enumerate() {
        if chosen.len() >= top_n {
            break;
        }
        let sector = candidate.security.sector_or_unclassified();
        let count = counts.entry(sector.to_string()).or_insert(0);
        if *count < caps.cap_for(sector) {
            *count += 1;
            chosen.insert(i);
        }
    }
    chosen
}

/// Top up with the best remaining candidates until `top_n` are chosen.
fn fill_remaining(chosen: &mut BTreeSet<usize>, available: usize, top_n: usize) {
    for i in 0..available {
        if chosen.len() >= top_n {
            break;
        }
        chosen.insert(i);
    }
}

/// Whether admitting `sector` keeps it within its cap, given the sectors
/// already held.
pub fn within_cap<'a>(caps: &SectorCaps, held: impl Iterator<Item = &'a str>, sector: &str) -> bool {
    let count = held.filter(|s| *s == sector).count();
    count < caps.cap_for(sector)
}
