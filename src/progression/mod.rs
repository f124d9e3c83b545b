//! Learning-path progression rules
//!
//! Pure validation over a per-user progress snapshot. Modules unlock
//! sequentially: module N+1 opens only after module N was completed with a
//! passing score. Nothing here touches storage; callers load the snapshot,
//! validate, then persist.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Score percentage required to pass a module exam or the final quiz
pub const PASSING_THRESHOLD_PERCENT: f64 = 60.0;

/// Progression rule rejection reasons
///
/// Each reason is distinct so the facade can render a precise message and
/// clients can branch on the code.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProgressionError {
    /// The proposed unlocked-module set is empty, does not start at 1, or has a gap
    #[error("invalid module sequence: {0}")]
    InvalidSequence(String),

    /// The module is not in the unlocked set
    #[error("module {module} is locked")]
    ModuleLocked { module: u32 },

    /// The prerequisite module has not been completed at all
    #[error("module {module} has not been completed")]
    PrerequisiteNotMet { module: u32 },

    /// A completion exists but scored below the passing threshold
    #[error("score of {percentage}% is below the 60% passing threshold")]
    FailingScore { percentage: f64 },

    /// A score entry is not a usable numeric result
    #[error("invalid score: {0}")]
    InvalidScore(String),
}

impl ProgressionError {
    /// Stable machine-readable code for error responses
    pub fn code(&self) -> &'static str {
        match self {
            ProgressionError::InvalidSequence(_) => "INVALID_SEQUENCE",
            ProgressionError::ModuleLocked { .. } => "MODULE_LOCKED",
            ProgressionError::PrerequisiteNotMet { .. } => "PREREQUISITE_NOT_MET",
            ProgressionError::FailingScore { .. } => "FAILING_SCORE",
            ProgressionError::InvalidScore(_) => "INVALID_SCORE",
        }
    }
}

/// Recorded result for one module exam
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ModuleScore {
    pub score: f64,
    pub max_score: f64,
    /// Rounded percentage, compared inclusively against the threshold
    pub percentage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exam_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

impl ModuleScore {
    /// Build an entry from a raw result, rounding the percentage
    pub fn from_result(score: f64, max_score: f64, exam_id: Option<String>) -> Self {
        let percentage = ((score / max_score) * 100.0).round();
        Self {
            score,
            max_score,
            percentage,
            exam_id,
            completed_at: Some(chrono::Utc::now().to_rfc3339()),
        }
    }

    pub fn is_passing(&self) -> bool {
        self.percentage >= PASSING_THRESHOLD_PERCENT
    }
}

/// Per-user progression state
///
/// `unlocked_modules` is always non-empty, anchored at 1, and contiguous.
/// Persisted embedded in the user record; `module_scores` keys are serialized
/// as strings for BSON map compatibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    #[serde(default = "default_unlocked")]
    pub unlocked_modules: BTreeSet<u32>,
    #[serde(default, with = "score_map")]
    pub module_scores: BTreeMap<u32, ModuleScore>,
    #[serde(default)]
    pub final_quiz_passed: bool,
}

fn default_unlocked() -> BTreeSet<u32> {
    BTreeSet::from([1])
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        Self {
            unlocked_modules: default_unlocked(),
            module_scores: BTreeMap::new(),
            final_quiz_passed: false,
        }
    }
}

impl ProgressSnapshot {
    /// Merge a validated update into the snapshot
    pub fn apply(&mut self, update: &ProgressUpdate) {
        if let Some(modules) = &update.unlocked_modules {
            self.unlocked_modules = modules.iter().copied().collect();
        }
        if let Some(scores) = &update.module_scores {
            for (module, entry) in scores {
                self.module_scores.insert(*module, entry.clone());
            }
        }
        if let Some(passed) = update.final_quiz_passed {
            self.final_quiz_passed = passed;
        }
    }
}

/// Client-proposed change to a progress snapshot
///
/// Closed type: unknown fields are rejected at the boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProgressUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlocked_modules: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_scores: Option<BTreeMap<u32, ModuleScore>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_quiz_passed: Option<bool>,
}

/// May `module` be unlocked given the current snapshot?
///
/// Module 1 is always unlockable. Any later module requires the previous one
/// to be completed with a passing score; exactly 60% passes.
pub fn can_unlock_module(
    snapshot: &ProgressSnapshot,
    module: u32,
) -> Result<(), ProgressionError> {
    if module == 0 {
        return Err(ProgressionError::InvalidSequence(
            "module ids start at 1".to_string(),
        ));
    }
    if module == 1 {
        return Ok(());
    }

    let previous = module - 1;
    match snapshot.module_scores.get(&previous) {
        None => Err(ProgressionError::PrerequisiteNotMet { module: previous }),
        Some(entry) if entry.is_passing() => Ok(()),
        Some(entry) => Err(ProgressionError::FailingScore {
            percentage: entry.percentage,
        }),
    }
}

/// A lesson may be completed iff its module is unlocked
pub fn can_complete_lesson(
    snapshot: &ProgressSnapshot,
    module: u32,
) -> Result<(), ProgressionError> {
    if snapshot.unlocked_modules.contains(&module) {
        Ok(())
    } else {
        Err(ProgressionError::ModuleLocked { module })
    }
}

/// Structural check on a quiz result; pass/fail is informational, not a rejection
pub fn can_complete_quiz(score: f64, max_score: f64) -> Result<(), ProgressionError> {
    if !score.is_finite() || !max_score.is_finite() || max_score <= 0.0 {
        return Err(ProgressionError::InvalidScore(format!(
            "{score}/{max_score} is not a usable result"
        )));
    }
    Ok(())
}

/// The final quiz must reach the passing threshold to be accepted
pub fn can_complete_final_quiz(score: f64, max_score: f64) -> Result<(), ProgressionError> {
    can_complete_quiz(score, max_score)?;
    let percentage = (score / max_score) * 100.0;
    if percentage < PASSING_THRESHOLD_PERCENT {
        return Err(ProgressionError::FailingScore { percentage });
    }
    Ok(())
}

/// Validate a candidate unlocked-module set: deduplicated and sorted, it must
/// be exactly `[1, 2, ..., N]`
pub fn validate_sequence(candidate: &[u32]) -> Result<(), ProgressionError> {
    let ordered: BTreeSet<u32> = candidate.iter().copied().collect();
    if ordered.is_empty() {
        return Err(ProgressionError::InvalidSequence(
            "no modules unlocked".to_string(),
        ));
    }

    for (i, module) in ordered.iter().enumerate() {
        let expected = i as u32 + 1;
        if *module != expected {
            return Err(if i == 0 {
                ProgressionError::InvalidSequence("sequence must start at module 1".to_string())
            } else {
                ProgressionError::InvalidSequence(format!("gap in sequence at module {expected}"))
            });
        }
    }

    Ok(())
}

/// Composite check for a client-proposed update
///
/// All violations are collected and returned together rather than
/// short-circuiting on the first:
/// - the new unlocked set must be a valid sequence,
/// - every newly added module must be unlockable against the *current* snapshot,
/// - every score key must be in the effective unlocked set (the incoming one
///   if present, else the snapshot's),
/// - every score entry must be a usable numeric result.
pub fn validate_update(
    snapshot: &ProgressSnapshot,
    update: &ProgressUpdate,
) -> Result<(), Vec<ProgressionError>> {
    let mut violations = Vec::new();

    if let Some(modules) = &update.unlocked_modules {
        if let Err(e) = validate_sequence(modules) {
            violations.push(e);
        }

        let candidate: BTreeSet<u32> = modules.iter().copied().collect();
        for added in candidate.difference(&snapshot.unlocked_modules) {
            if let Err(e) = can_unlock_module(snapshot, *added) {
                violations.push(e);
            }
        }
    }

    if let Some(scores) = &update.module_scores {
        let effective: BTreeSet<u32> = match &update.unlocked_modules {
            Some(modules) => modules.iter().copied().collect(),
            None => snapshot.unlocked_modules.clone(),
        };

        for (module, entry) in scores {
            if !effective.contains(module) {
                violations.push(ProgressionError::ModuleLocked { module: *module });
            }
            if let Err(e) = can_complete_quiz(entry.score, entry.max_score) {
                violations.push(e);
            }
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

/// Highest currently unlocked module
pub fn highest_unlocked(snapshot: &ProgressSnapshot) -> u32 {
    snapshot.unlocked_modules.iter().next_back().copied().unwrap_or(1)
}

/// The next module that could be unlocked right now, if any
pub fn next_unlockable(snapshot: &ProgressSnapshot) -> Option<u32> {
    let highest = highest_unlocked(snapshot);
    match snapshot.module_scores.get(&highest) {
        Some(entry) if entry.is_passing() => Some(highest + 1),
        _ => None,
    }
}

/// Serialize module-score map keys as strings (BSON maps require string keys)
mod score_map {
    use super::ModuleScore;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S>(
        map: &BTreeMap<u32, ModuleScore>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_map(map.iter().map(|(k, v)| (k.to_string(), v)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<u32, ModuleScore>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = BTreeMap::<String, ModuleScore>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(k, v)| k.parse::<u32>().map(|k| (k, v)).map_err(D::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(percentage: f64) -> ModuleScore {
        ModuleScore {
            score: percentage,
            max_score: 100.0,
            percentage,
            exam_id: None,
            completed_at: None,
        }
    }

    fn snapshot_with(unlocked: &[u32], scores: &[(u32, f64)]) -> ProgressSnapshot {
        ProgressSnapshot {
            unlocked_modules: unlocked.iter().copied().collect(),
            module_scores: scores.iter().map(|(m, p)| (*m, score(*p))).collect(),
            final_quiz_passed: false,
        }
    }

    #[test]
    fn test_module_one_always_unlockable() {
        let snapshot = ProgressSnapshot::default();
        assert!(can_unlock_module(&snapshot, 1).is_ok());
    }

    #[test]
    fn test_unlock_requires_previous_completion() {
        let snapshot = snapshot_with(&[1], &[]);
        assert_eq!(
            can_unlock_module(&snapshot, 2),
            Err(ProgressionError::PrerequisiteNotMet { module: 1 })
        );

        let snapshot = snapshot_with(&[1], &[(1, 75.0)]);
        assert!(can_unlock_module(&snapshot, 2).is_ok());
    }

    #[test]
    fn test_threshold_boundary() {
        let exactly = snapshot_with(&[1], &[(1, 60.0)]);
        assert!(can_unlock_module(&exactly, 2).is_ok());

        let below = snapshot_with(&[1], &[(1, 59.0)]);
        assert_eq!(
            can_unlock_module(&below, 2),
            Err(ProgressionError::FailingScore { percentage: 59.0 })
        );
    }

    #[test]
    fn test_lesson_requires_unlocked_module() {
        let snapshot = snapshot_with(&[1, 2], &[]);
        assert!(can_complete_lesson(&snapshot, 2).is_ok());
        assert_eq!(
            can_complete_lesson(&snapshot, 3),
            Err(ProgressionError::ModuleLocked { module: 3 })
        );
    }

    #[test]
    fn test_quiz_structural_validity() {
        assert!(can_complete_quiz(0.0, 10.0).is_ok());
        assert!(can_complete_quiz(3.0, 0.0).is_err());
        assert!(can_complete_quiz(3.0, -5.0).is_err());
        assert!(can_complete_quiz(f64::NAN, 10.0).is_err());
    }

    #[test]
    fn test_final_quiz_threshold() {
        assert!(can_complete_final_quiz(6.0, 10.0).is_ok());
        assert_eq!(
            can_complete_final_quiz(5.9, 10.0),
            Err(ProgressionError::FailingScore { percentage: 59.0 })
        );
        assert!(can_complete_final_quiz(5.0, 0.0).is_err());
    }

    #[test]
    fn test_validate_sequence() {
        assert!(validate_sequence(&[1, 2, 3]).is_ok());
        assert!(validate_sequence(&[3, 1, 2]).is_ok());
        assert!(validate_sequence(&[1, 1, 2]).is_ok());
        assert!(validate_sequence(&[1, 3]).is_err());
        assert!(validate_sequence(&[2, 3]).is_err());
        assert!(validate_sequence(&[]).is_err());
    }

    #[test]
    fn test_validate_update_accepts_earned_unlock() {
        let snapshot = snapshot_with(&[1], &[(1, 75.0)]);
        let update = ProgressUpdate {
            unlocked_modules: Some(vec![1, 2]),
            ..Default::default()
        };
        assert!(validate_update(&snapshot, &update).is_ok());
    }

    #[test]
    fn test_validate_update_collects_all_violations() {
        let snapshot = snapshot_with(&[1], &[]);
        let update = ProgressUpdate {
            // Gap AND an unearned unlock
            unlocked_modules: Some(vec![1, 3]),
            // Score for a module outside the effective unlocked set
            module_scores: Some(BTreeMap::from([(4, score(80.0))])),
            final_quiz_passed: None,
        };

        let violations = validate_update(&snapshot, &update).unwrap_err();
        let codes: Vec<&str> = violations.iter().map(|v| v.code()).collect();
        assert!(codes.contains(&"INVALID_SEQUENCE"));
        assert!(codes.contains(&"PREREQUISITE_NOT_MET"));
        assert!(codes.contains(&"MODULE_LOCKED"));
    }

    #[test]
    fn test_validate_update_scores_against_incoming_set() {
        let snapshot = snapshot_with(&[1], &[(1, 90.0)]);
        let update = ProgressUpdate {
            unlocked_modules: Some(vec![1, 2]),
            module_scores: Some(BTreeMap::from([(2, score(70.0))])),
            final_quiz_passed: None,
        };
        // Module 2 is locked in the snapshot but present in the incoming set
        assert!(validate_update(&snapshot, &update).is_ok());
    }

    #[test]
    fn test_next_unlockable() {
        let snapshot = snapshot_with(&[1], &[]);
        assert_eq!(next_unlockable(&snapshot), None);

        let snapshot = snapshot_with(&[1], &[(1, 60.0)]);
        assert_eq!(next_unlockable(&snapshot), Some(2));

        let snapshot = snapshot_with(&[1, 2], &[(1, 80.0), (2, 40.0)]);
        assert_eq!(highest_unlocked(&snapshot), 2);
        assert_eq!(next_unlockable(&snapshot), None);
    }

    #[test]
    fn test_apply_merges_scores() {
        let mut snapshot = snapshot_with(&[1], &[(1, 80.0)]);
        snapshot.apply(&ProgressUpdate {
            unlocked_modules: Some(vec![1, 2]),
            module_scores: Some(BTreeMap::from([(2, score(65.0))])),
            final_quiz_passed: None,
        });

        assert_eq!(snapshot.unlocked_modules, BTreeSet::from([1, 2]));
        assert_eq!(snapshot.module_scores.len(), 2);
        assert!(!snapshot.final_quiz_passed);
    }

    #[test]
    fn test_snapshot_roundtrips_through_json() {
        let snapshot = snapshot_with(&[1, 2], &[(1, 75.0)]);
        let json = serde_json::to_string(&snapshot).expect("serialize");
        // Map keys are strings on the wire
        assert!(json.contains("\"1\":"));
        let back: ProgressSnapshot = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, snapshot);
    }
}
