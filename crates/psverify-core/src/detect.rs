//! PDQ profile detection.
//!
//! Scores each profile by the number of its signature patterns that occur
//! anywhere in the script, then applies the policy:
//!
//!   - highest score wins
//!   - below `min_confidence` the result is undetermined
//!   - ties at the maximum go to the earliest profile in `priority`
//!
//! The function is pure: same text and policy, same answer.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::context::Profile;
use crate::rules::matchers;

/// Tie-break order used when the policy does not mention a profile.
pub const DEFAULT_PRIORITY: [Profile; 3] = [Profile::Inventory, Profile::Deploy, Profile::Connect];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DetectionPolicy {
    /// Minimum score a profile needs to be chosen.
    pub min_confidence: usize,
    /// Tie-break order, most preferred first.
    pub priority: Vec<Profile>,
}

impl Default for DetectionPolicy {
    fn default() -> Self {
        Self {
            min_confidence: 2,
            priority: DEFAULT_PRIORITY.to_vec(),
        }
    }
}

impl DetectionPolicy {
    fn rank(&self, profile: Profile) -> usize {
        match self.priority.iter().position(|p| *p == profile) {
            Some(i) => i,
            None => {
                let fallback = DEFAULT_PRIORITY
                    .iter()
                    .position(|p| *p == profile)
                    .unwrap_or(DEFAULT_PRIORITY.len());
                self.priority.len() + fallback
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DetectionScores {
    pub inventory: usize,
    pub deploy: usize,
    pub connect: usize,
}

impl DetectionScores {
    pub fn get(&self, profile: Profile) -> usize {
        match profile {
            Profile::Inventory => self.inventory,
            Profile::Deploy => self.deploy,
            Profile::Connect => self.connect,
        }
    }

    pub fn max(&self) -> usize {
        self.inventory.max(self.deploy).max(self.connect)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub profile: Option<Profile>,
    pub scores: DetectionScores,
}

#[derive(Debug, Clone, Copy)]
enum Signature {
    Literal(&'static str),
    Pattern(&'static str),
}

const INVENTORY_SIGNATURES: &[Signature] = &[
    Signature::Literal("new-object pscustomobject"),
    Signature::Literal("convertto-json"),
    Signature::Literal("| select-object"),
    Signature::Literal("get-ciminstance"),
    Signature::Literal("get-wmiobject"),
    Signature::Literal("[pscustomobject]@{"),
];

const DEPLOY_SIGNATURES: &[Signature] = &[
    Signature::Literal("start-process"),
    Signature::Literal("msiexec"),
    Signature::Literal("/quiet"),
    Signature::Literal("/silent"),
    Signature::Literal("install"),
    Signature::Literal("exit "),
    Signature::Pattern(r"test-path.*exe"),
    Signature::Literal("copy-item"),
];

const CONNECT_SIGNATURES: &[Signature] = &[
    Signature::Literal("invoke-command"),
    Signature::Literal("new-pssession"),
    Signature::Literal("enter-pssession"),
    Signature::Literal("-computername"),
    Signature::Literal("invoke-cimmethod"),
];

fn signatures(profile: Profile) -> &'static [Signature] {
    match profile {
        Profile::Inventory => INVENTORY_SIGNATURES,
        Profile::Deploy => DEPLOY_SIGNATURES,
        Profile::Connect => CONNECT_SIGNATURES,
    }
}

fn score(lowered: &str, profile: Profile) -> usize {
    signatures(profile)
        .iter()
        .filter(|sig| match sig {
            Signature::Literal(lit) => lowered.contains(lit),
            // A pattern that fails to compile counts as absent.
            Signature::Pattern(p) => match matchers::compile(p) {
                Ok(re) => re.is_match(lowered),
                Err(err) => {
                    warn!(profile = profile.label(), error = %err, "signature could not run");
                    false
                }
            },
        })
        .count()
}

/// Score every profile against `text`.
pub fn score_profiles(text: &str) -> DetectionScores {
    let lowered = text.to_lowercase();
    DetectionScores {
        inventory: score(&lowered, Profile::Inventory),
        deploy: score(&lowered, Profile::Deploy),
        connect: score(&lowered, Profile::Connect),
    }
}

/// Pick the profile for `text`, or `None` below the confidence threshold.
pub fn detect_profile(text: &str, policy: &DetectionPolicy) -> Detection {
    let scores = score_profiles(text);
    Detection {
        profile: decide(&scores, policy),
        scores,
    }
}

/// Decision step, separated from scoring so the policy can be exercised
/// on synthetic scores.
pub fn decide(scores: &DetectionScores, policy: &DetectionPolicy) -> Option<Profile> {
    let max = scores.max();
    if max < policy.min_confidence {
        return None;
    }
    Profile::ALL
        .into_iter()
        .filter(|p| scores.get(*p) == max)
        .min_by_key(|p| policy.rank(*p))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect(text: &str) -> Detection {
        detect_profile(text, &DetectionPolicy::default())
    }

    #[test]
    fn every_signature_pattern_compiles() {
        for profile in [Profile::Inventory, Profile::Deploy, Profile::Connect] {
            for sig in signatures(profile) {
                if let Signature::Pattern(p) = sig {
                    assert!(matchers::compile(p).is_ok(), "{p}");
                }
            }
        }
    }

    #[test]
    fn inventory_script_is_detected() {
        let text = r#"
$os = Get-CimInstance Win32_OperatingSystem
[PSCustomObject]@{ Name = $os.Caption } | ConvertTo-Json
"#;
        let d = detect(text);
        assert_eq!(d.profile, Some(Profile::Inventory));
        assert_eq!(d.scores.inventory, 3);
    }

    #[test]
    fn deploy_script_is_detected() {
        let text = r#"
Start-Process msiexec.exe -ArgumentList '/i app.msi /quiet' -Wait
exit 0
"#;
        let d = detect(text);
        assert_eq!(d.profile, Some(Profile::Deploy));
        assert!(d.scores.deploy >= 3);
    }

    #[test]
    fn connect_script_is_detected() {
        let text = "Invoke-Command -ComputerName $pc -ScriptBlock { hostname }";
        let d = detect(text);
        assert_eq!(d.profile, Some(Profile::Connect));
        assert_eq!(d.scores.connect, 2);
    }

    #[test]
    fn below_threshold_is_undetermined() {
        let d = detect("Get-Date\nGet-CimInstance Win32_BIOS\n");
        assert_eq!(d.scores.inventory, 1);
        assert_eq!(d.profile, None);
    }

    #[test]
    fn empty_text_is_undetermined() {
        let d = detect("");
        assert_eq!(d.scores, DetectionScores::default());
        assert_eq!(d.profile, None);
    }

    #[test]
    fn ties_follow_default_priority() {
        let policy = DetectionPolicy::default();
        let all_tied = DetectionScores { inventory: 2, deploy: 2, connect: 2 };
        assert_eq!(decide(&all_tied, &policy), Some(Profile::Inventory));

        let deploy_connect = DetectionScores { inventory: 0, deploy: 3, connect: 3 };
        assert_eq!(decide(&deploy_connect, &policy), Some(Profile::Deploy));
    }

    #[test]
    fn ties_follow_configured_priority() {
        let policy = DetectionPolicy {
            min_confidence: 2,
            priority: vec![Profile::Connect],
        };
        let tied = DetectionScores { inventory: 2, deploy: 2, connect: 2 };
        assert_eq!(decide(&tied, &policy), Some(Profile::Connect));

        // Unlisted profiles fall back to the default order after listed ones.
        let tied = DetectionScores { inventory: 2, deploy: 2, connect: 0 };
        assert_eq!(decide(&tied, &policy), Some(Profile::Inventory));
    }

    #[test]
    fn threshold_is_configurable() {
        let strict = DetectionPolicy {
            min_confidence: 4,
            ..Default::default()
        };
        let scores = DetectionScores { inventory: 3, deploy: 0, connect: 0 };
        assert_eq!(decide(&scores, &strict), None);
        assert_eq!(decide(&scores, &DetectionPolicy::default()), Some(Profile::Inventory));
    }

    #[test]
    fn adding_signatures_for_winner_never_changes_choice() {
        let mut text = String::from("Invoke-Command -ComputerName x\n");
        let before = detect(&text).profile;
        assert_eq!(before, Some(Profile::Connect));
        for extra in ["New-PSSession\n", "Enter-PSSession\n", "Invoke-CimMethod\n"] {
            text.push_str(extra);
            assert_eq!(detect(&text).profile, Some(Profile::Connect));
        }
    }

    #[test]
    fn repeated_signature_counts_once() {
        let d = detect("Copy-Item a b\nCopy-Item c d\nCopy-Item e f\n");
        assert_eq!(d.scores.deploy, 1);
        assert_eq!(d.profile, None);
    }

    #[test]
    fn detection_is_deterministic() {
        let text = "Start-Process setup.exe /S\nCopy-Item x y\n";
        assert_eq!(detect(text), detect(text));
    }
}
