// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Attack plan generators
//!
//! An attack plan is an ordered sequence of payload tuples, one slot per
//! payload position. Emission order is deterministic so runs are
//! reproducible.

use std::fmt;

use super::positions::ORIGINAL_MARKER;
use crate::error::{Error, Result};

/// The four canonical payload-position strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackType {
    /// One payload list; each payload tried at each position in turn,
    /// other positions left original. Size `|P0| * k`.
    Sniper,
    /// One payload list; the same payload placed at every position.
    /// Size `|P0|`.
    BatteringRam,
    /// One list per position, walked in parallel. Size `min |Pi|`.
    Pitchfork,
    /// One list per position, full Cartesian product in odometer order
    /// (rightmost position varies fastest). Size `prod |Pi|`.
    ClusterBomb,
}

impl AttackType {
    /// Parse a user-facing attack type name
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().replace('-', "_").as_str() {
            "sniper" => Ok(AttackType::Sniper),
            "battering_ram" | "batteringram" => Ok(AttackType::BatteringRam),
            "pitchfork" => Ok(AttackType::Pitchfork),
            "cluster_bomb" | "clusterbomb" => Ok(AttackType::ClusterBomb),
            other => Err(Error::Attack(format!("unknown attack type: {other}"))),
        }
    }
}

impl fmt::Display for AttackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttackType::Sniper => "sniper",
            AttackType::BatteringRam => "battering_ram",
            AttackType::Pitchfork => "pitchfork",
            AttackType::ClusterBomb => "cluster_bomb",
        };
        f.write_str(s)
    }
}

/// Generate the payload tuples for an attack.
///
/// `positions` is the number of payload positions in the raw request; a
/// request with zero positions yields an empty plan for every attack type.
pub fn generate(
    attack: AttackType,
    payload_sets: &[Vec<String>],
    positions: usize,
) -> Result<Vec<Vec<String>>> {
    if positions == 0 {
        return Ok(Vec::new());
    }

    match attack {
        AttackType::Sniper => {
            let payloads = first_set(payload_sets)?;
            let mut plan = Vec::with_capacity(payloads.len() * positions);
            for payload in payloads {
                for slot in 0..positions {
                    let mut tuple = vec![ORIGINAL_MARKER.to_string(); positions];
                    tuple[slot] = payload.clone();
                    plan.push(tuple);
                }
            }
            Ok(plan)
        }
        AttackType::BatteringRam => {
            let payloads = first_set(payload_sets)?;
            Ok(payloads
                .iter()
                .map(|p| vec![p.clone(); positions])
                .collect())
        }
        AttackType::Pitchfork => {
            let sets = per_position_sets(payload_sets, positions)?;
            let rounds = sets.iter().map(|s| s.len()).min().unwrap_or(0);
            Ok((0..rounds)
                .map(|i| sets.iter().map(|s| s[i].clone()).collect())
                .collect())
        }
        AttackType::ClusterBomb => {
            let sets = per_position_sets(payload_sets, positions)?;
            if sets.iter().any(|s| s.is_empty()) {
                return Ok(Vec::new());
            }
            let total: usize = sets.iter().map(|s| s.len()).product();
            let mut plan = Vec::with_capacity(total);
            let mut odometer = vec![0usize; positions];
            loop {
                plan.push(
                    odometer
                        .iter()
                        .enumerate()
                        .map(|(slot, &i)| sets[slot][i].clone())
                        .collect(),
                );
                // Advance rightmost-fastest
                let mut slot = positions;
                loop {
                    if slot == 0 {
                        return Ok(plan);
                    }
                    slot -= 1;
                    odometer[slot] += 1;
                    if odometer[slot] < sets[slot].len() {
                        break;
                    }
                    odometer[slot] = 0;
                }
            }
        }
    }
}

fn first_set(payload_sets: &[Vec<String>]) -> Result<&Vec<String>> {
    payload_sets
        .first()
        .ok_or_else(|| Error::Attack("at least one payload set is required".to_string()))
}

fn per_position_sets(payload_sets: &[Vec<String>], positions: usize) -> Result<&[Vec<String>]> {
    if payload_sets.len() < positions {
        return Err(Error::Attack(format!(
            "{positions} positions require {positions} payload sets, got {}",
            payload_sets.len()
        )));
    }
    Ok(&payload_sets[..positions])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_sniper_size_and_shape() {
        let plan = generate(AttackType::Sniper, &[set(&["a", "b", "c"])], 2).unwrap();
        assert_eq!(plan.len(), 6);
        for tuple in &plan {
            let originals = tuple.iter().filter(|v| *v == ORIGINAL_MARKER).count();
            assert_eq!(originals, 1);
        }
        assert_eq!(plan[0], vec!["a", ORIGINAL_MARKER]);
        assert_eq!(plan[1], vec![ORIGINAL_MARKER, "a"]);
    }

    #[test]
    fn test_battering_ram() {
        let plan = generate(AttackType::BatteringRam, &[set(&["a", "b", "c"])], 2).unwrap();
        assert_eq!(plan.len(), 3);
        for tuple in &plan {
            assert_eq!(tuple[0], tuple[1]);
        }
    }

    #[test]
    fn test_pitchfork_parallel_iteration() {
        let sets = vec![set(&["a", "b", "c"]), set(&["x", "y", "z"])];
        let plan = generate(AttackType::Pitchfork, &sets, 2).unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[0], vec!["a", "x"]);
        assert_eq!(plan[1], vec!["b", "y"]);
        assert_eq!(plan[2], vec!["c", "z"]);
    }

    #[test]
    fn test_pitchfork_min_length() {
        let sets = vec![set(&["a", "b", "c"]), set(&["x"])];
        let plan = generate(AttackType::Pitchfork, &sets, 2).unwrap();
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn test_cluster_bomb_odometer_order() {
        let sets = vec![set(&["admin", "user"]), set(&["1", "2", "3"])];
        let plan = generate(AttackType::ClusterBomb, &sets, 2).unwrap();
        assert_eq!(plan.len(), 6);
        let expected = [
            vec!["admin", "1"],
            vec!["admin", "2"],
            vec!["admin", "3"],
            vec!["user", "1"],
            vec!["user", "2"],
            vec!["user", "3"],
        ];
        for (tuple, want) in plan.iter().zip(expected.iter()) {
            assert_eq!(tuple, want);
        }
    }

    #[test]
    fn test_zero_positions_empty_plan() {
        for attack in [
            AttackType::Sniper,
            AttackType::BatteringRam,
            AttackType::Pitchfork,
            AttackType::ClusterBomb,
        ] {
            let plan = generate(attack, &[set(&["a"])], 0).unwrap();
            assert!(plan.is_empty());
        }
    }

    #[test]
    fn test_missing_sets_rejected() {
        assert!(generate(AttackType::Sniper, &[], 1).is_err());
        assert!(generate(AttackType::ClusterBomb, &[set(&["a"])], 2).is_err());
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(AttackType::parse("sniper").unwrap(), AttackType::Sniper);
        assert_eq!(
            AttackType::parse("Cluster-Bomb").unwrap(),
            AttackType::ClusterBomb
        );
        assert!(AttackType::parse("nuke").is_err());
    }
}
