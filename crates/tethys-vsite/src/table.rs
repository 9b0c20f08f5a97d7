//! Stage-leveled virtual site table.

use std::collections::HashMap;

use glam::DVec3;
use tethys_types::{TethysError, TethysResult};

use crate::rules::VirtualSite;

/// Validated virtual sites, leveled into dependency stages.
///
/// Stage 0 sites depend only on ordinary particles; a site lands in stage
/// `n + 1` when its deepest site parent is in stage `n`. Position updates
/// walk stages upward, force redistribution walks them downward.
#[derive(Debug, Clone)]
pub struct VirtualSiteTable {
    sites: Vec<VirtualSite>,
    /// Indices into `sites`, grouped by stage, increasing.
    stages: Vec<Vec<usize>>,
}

impl VirtualSiteTable {
    /// Validates the sites and levels them into stages.
    ///
    /// Rejects out-of-range particles, self-referential sites, sites with
    /// nonzero mass, duplicate definitions for one particle, and cyclic
    /// dependencies between sites.
    pub fn new(sites: Vec<VirtualSite>, masses: &[f64]) -> TethysResult<Self> {
        let particle_count = masses.len() as u32;
        let mut site_of: HashMap<u32, usize> = HashMap::new();
        for (idx, site) in sites.iter().enumerate() {
            if site.site >= particle_count {
                return Err(TethysError::InvalidTopology(format!(
                    "virtual site particle {} is outside the system",
                    site.site
                )));
            }
            if masses[site.site as usize] != 0.0 {
                return Err(TethysError::InvalidTopology(format!(
                    "virtual site particle {} must be massless, has mass {}",
                    site.site,
                    masses[site.site as usize]
                )));
            }
            if site_of.insert(site.site, idx).is_some() {
                return Err(TethysError::InvalidTopology(format!(
                    "particle {} has more than one virtual site definition",
                    site.site
                )));
            }
            for &parent in site.rule.parents() {
                if parent >= particle_count {
                    return Err(TethysError::InvalidTopology(format!(
                        "virtual site {} references parent {} outside the system",
                        site.site, parent
                    )));
                }
                if parent == site.site {
                    return Err(TethysError::InvalidTopology(format!(
                        "virtual site {} references itself",
                        site.site
                    )));
                }
            }
        }

        let stage_levels = level_stages(&sites, &site_of)?;
        let stage_count = stage_levels.iter().copied().max().map_or(0, |m| m + 1);
        let mut stages = vec![Vec::new(); stage_count];
        for (idx, &level) in stage_levels.iter().enumerate() {
            stages[level].push(idx);
        }
        Ok(Self { sites, stages })
    }

    /// Number of dependency stages.
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Number of virtual sites.
    pub fn site_count(&self) -> usize {
        self.sites.len()
    }

    /// Recomputes every site position from its parents, lowest stage
    /// first so dependent sites see fresh parent positions.
    pub fn compute_positions(&self, positions: &mut [DVec3]) {
        for stage in &self.stages {
            for &idx in stage {
                let site = &self.sites[idx];
                positions[site.site as usize] = site.rule.position(positions);
            }
        }
    }

    /// Pushes forces accumulated on sites back onto their parents,
    /// highest stage first so a force transferred onto an intermediate
    /// site is redistributed in a later (lower) stage. Site force slots
    /// are zeroed once distributed.
    pub fn redistribute_forces(&self, positions: &[DVec3], forces: &mut [DVec3]) {
        for stage in self.stages.iter().rev() {
            for &idx in stage {
                let site = &self.sites[idx];
                let slot = site.site as usize;
                let force = forces[slot];
                forces[slot] = DVec3::ZERO;
                site.rule.redistribute(positions, force, forces);
            }
        }
    }
}

/// Depth-first leveling with cycle detection. Returns the stage of each
/// site, or an error naming a particle on a dependency cycle.
fn level_stages(sites: &[VirtualSite], site_of: &HashMap<u32, usize>) -> TethysResult<Vec<usize>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }
    let mut marks = vec![Mark::Unvisited; sites.len()];
    let mut levels = vec![0usize; sites.len()];
    // Iterative DFS; the explicit stack carries (site, next-parent cursor).
    for root in 0..sites.len() {
        if marks[root] == Mark::Done {
            continue;
        }
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        marks[root] = Mark::InProgress;
        while let Some((idx, cursor)) = stack.pop() {
            let parents = sites[idx].rule.parents();
            if cursor < parents.len() {
                stack.push((idx, cursor + 1));
                let parent = parents[cursor];
                if let Some(&pidx) = site_of.get(&parent) {
                    match marks[pidx] {
                        Mark::Unvisited => {
                            marks[pidx] = Mark::InProgress;
                            stack.push((pidx, 0));
                        }
                        Mark::InProgress => {
                            return Err(TethysError::InvalidTopology(format!(
                                "virtual site dependency cycle through particle {parent}"
                            )));
                        }
                        Mark::Done => {
                            levels[idx] = levels[idx].max(levels[pidx] + 1);
                        }
                    }
                }
            } else {
                marks[idx] = Mark::Done;
                if let Some(&(below, _)) = stack.last() {
                    levels[below] = levels[below].max(levels[idx] + 1);
                }
            }
        }
    }
    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::VirtualSiteRule;

    fn midpoint(site: u32, a: u32, b: u32) -> VirtualSite {
        VirtualSite {
            site,
            rule: VirtualSiteRule::TwoParticleAverage {
                parents: [a, b],
                weights: [0.5, 0.5],
            },
        }
    }

    #[test]
    fn chained_sites_level_into_stages() {
        // Site 3 depends on site 2, which depends on ordinary particles.
        let masses = vec![1.0, 1.0, 0.0, 0.0];
        let table =
            VirtualSiteTable::new(vec![midpoint(3, 2, 0), midpoint(2, 0, 1)], &masses).unwrap();
        assert_eq!(table.stage_count(), 2);
    }

    #[test]
    fn chained_positions_resolve_in_order() {
        let masses = vec![1.0, 1.0, 0.0, 0.0];
        let table =
            VirtualSiteTable::new(vec![midpoint(3, 2, 0), midpoint(2, 0, 1)], &masses).unwrap();
        let mut positions = vec![
            DVec3::ZERO,
            DVec3::new(4.0, 0.0, 0.0),
            DVec3::splat(99.0), // stale
            DVec3::splat(99.0), // stale
        ];
        table.compute_positions(&mut positions);
        assert_eq!(positions[2], DVec3::new(2.0, 0.0, 0.0));
        assert_eq!(positions[3], DVec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn chained_force_redistribution_reaches_real_particles() {
        let masses = vec![1.0, 1.0, 0.0, 0.0];
        let table =
            VirtualSiteTable::new(vec![midpoint(3, 2, 0), midpoint(2, 0, 1)], &masses).unwrap();
        let mut positions = vec![DVec3::ZERO, DVec3::new(4.0, 0.0, 0.0), DVec3::ZERO, DVec3::ZERO];
        table.compute_positions(&mut positions);
        let mut forces = vec![DVec3::ZERO, DVec3::ZERO, DVec3::ZERO, DVec3::new(8.0, 0.0, 0.0)];
        table.redistribute_forces(&positions, &mut forces);
        // Site 3 splits between site 2 and particle 0; site 2's share then
        // splits between particles 0 and 1.
        assert_eq!(forces[3], DVec3::ZERO);
        assert_eq!(forces[2], DVec3::ZERO);
        assert!((forces[0].x - 6.0).abs() < 1e-12);
        assert!((forces[1].x - 2.0).abs() < 1e-12);
    }

    /// Three-stage chain: the force decomposition is only correct when
    /// the highest stage is processed first, so its contribution has
    /// landed on lower-stage sites before they redistribute.
    #[test]
    fn three_stage_chain_requires_descending_order() {
        // Stage 0: site 2 = midpoint(0, 1)
        // Stage 1: site 3 = midpoint(2, 0)
        // Stage 2: site 4 = midpoint(3, 2)
        let masses = vec![1.0, 1.0, 0.0, 0.0, 0.0];
        let sites = vec![midpoint(2, 0, 1), midpoint(3, 2, 0), midpoint(4, 3, 2)];
        let table = VirtualSiteTable::new(sites.clone(), &masses).unwrap();
        assert_eq!(table.stage_count(), 3);

        let mut positions = vec![
            DVec3::ZERO,
            DVec3::new(4.0, 0.0, 0.0),
            DVec3::ZERO,
            DVec3::ZERO,
            DVec3::ZERO,
        ];
        table.compute_positions(&mut positions);

        let f = 8.0;
        let mut forces = vec![DVec3::ZERO; 5];
        forces[4] = DVec3::new(f, 0.0, 0.0);
        table.redistribute_forces(&positions, &mut forces);

        // Hand-computed descending-order decomposition:
        // site 4 -> f/2 each to sites 3 and 2; site 3 -> f/4 each to
        // site 2 and particle 0; site 2 (now 3f/4) -> 3f/8 each parent.
        assert!((forces[0].x - 5.0 * f / 8.0).abs() < 1e-12);
        assert!((forces[1].x - 3.0 * f / 8.0).abs() < 1e-12);
        assert_eq!(forces[2], DVec3::ZERO);
        assert_eq!(forces[3], DVec3::ZERO);

        // An ascending sweep is provably wrong: sites redistribute before
        // their own share arrives, stranding force on zero-mass sites.
        let mut wrong = vec![DVec3::ZERO; 5];
        wrong[4] = DVec3::new(f, 0.0, 0.0);
        for site in &sites {
            let slot = site.site as usize;
            let force = wrong[slot];
            wrong[slot] = DVec3::ZERO;
            site.rule.redistribute(&positions, force, &mut wrong);
        }
        let stranded: f64 = wrong[2].x + wrong[3].x;
        assert!(stranded > 0.0, "ascending order should strand force on sites");
        assert!((wrong[0].x - forces[0].x).abs() > 1e-9);
    }

    #[test]
    fn cycle_is_rejected() {
        let masses = vec![1.0, 0.0, 0.0];
        let result = VirtualSiteTable::new(vec![midpoint(1, 2, 0), midpoint(2, 1, 0)], &masses);
        assert!(result.is_err());
    }

    #[test]
    fn massive_site_is_rejected() {
        let masses = vec![1.0, 1.0, 0.5];
        let result = VirtualSiteTable::new(vec![midpoint(2, 0, 1)], &masses);
        assert!(result.is_err());
    }

    #[test]
    fn duplicate_definition_is_rejected() {
        let masses = vec![1.0, 1.0, 0.0];
        let result = VirtualSiteTable::new(vec![midpoint(2, 0, 1), midpoint(2, 1, 0)], &masses);
        assert!(result.is_err());
    }
}
