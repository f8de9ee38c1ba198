// config.rs — Policy configuration loaded from a YAML file.
//
// The policy file is the single source of truth for what the gate permits:
// which operation types exist, which path prefixes are writable, who may
// talk to the bot, how fast, and how risky a plan may be before approval
// is refused outright.
//
// Loading is parse-then-validate. serde handles the shape; `validate()`
// enforces cross-field rules and returns the first violation found, in a
// fixed order, so error messages are deterministic.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::rate_limit::{LimitPolicy, RateBucket};

/// Every operation type the executor knows how to perform.
pub const KNOWN_OPS: &[&str] = &["list_dir", "read_file", "create_file", "patch_file"];

/// Discrete risk classification derived from a numeric score.
///
/// Variant order matters: `#[derive(PartialOrd, Ord)]` compares by
/// declaration order, so `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Map a 0–100 score to a level (≥80 critical, ≥60 high, ≥30 medium).
    pub fn from_score(score: u32) -> Self {
        match score {
            s if s >= 80 => RiskLevel::Critical,
            s if s >= 60 => RiskLevel::High,
            s if s >= 30 => RiskLevel::Medium,
            _ => RiskLevel::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOW" => Ok(RiskLevel::Low),
            "MEDIUM" => Ok(RiskLevel::Medium),
            "HIGH" => Ok(RiskLevel::High),
            "CRITICAL" => Ok(RiskLevel::Critical),
            other => Err(format!("unknown risk level '{}'", other)),
        }
    }
}

/// Operation allow/deny lists for the executor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutorPolicy {
    pub allowed_ops: Vec<String>,
    /// Operation names that must never appear in `allowed_ops`.
    #[serde(default)]
    pub prohibit: Vec<String>,
}

/// Who may use the bot at all.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsersPolicy {
    #[serde(default)]
    pub allowlist_user_ids: Vec<i64>,
    /// With an empty allowlist: reject everyone (true) or admit everyone (false).
    #[serde(default = "default_true")]
    pub fail_closed_when_empty: bool,
}

impl Default for UsersPolicy {
    fn default() -> Self {
        Self {
            allowlist_user_ids: Vec::new(),
            fail_closed_when_empty: true,
        }
    }
}

/// Per-minute caps, one per rate bucket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub command_per_minute: u32,
    pub plan_per_minute: u32,
    pub approve_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            command_per_minute: 30,
            plan_per_minute: 5,
            approve_per_minute: 5,
        }
    }
}

impl RateLimitConfig {
    /// The sliding-window policy for a bucket (always a 60-second window).
    pub fn policy_for(&self, bucket: RateBucket) -> LimitPolicy {
        let max_events = match bucket {
            RateBucket::Command => self.command_per_minute,
            RateBucket::Plan => self.plan_per_minute,
            RateBucket::Approve => self.approve_per_minute,
        };
        LimitPolicy::per_minute(max_events)
    }
}

/// Confirmation token shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShortTokenPolicy {
    #[serde(default = "default_token_length")]
    pub length: usize,
}

impl Default for ShortTokenPolicy {
    fn default() -> Self {
        Self {
            length: default_token_length(),
        }
    }
}

/// Plan lifetime settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanPolicy {
    /// Minutes a pending plan stays approvable.
    pub ttl_minutes: u32,
    #[serde(default)]
    pub short_token: ShortTokenPolicy,
}

impl Default for PlanPolicy {
    fn default() -> Self {
        Self {
            ttl_minutes: 10,
            short_token: ShortTokenPolicy::default(),
        }
    }
}

/// Per-operation weights for the risk rubric.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RiskScoringConfig {
    pub list_dir: u32,
    pub read_file: u32,
    pub create_file: u32,
    pub patch_file: u32,
    /// Added per full 20 lines of changed/new content (capped per op).
    pub per_20_changed_lines: u32,
    /// Added per distinct path beyond the first (capped per plan).
    pub per_extra_file: u32,
}

impl Default for RiskScoringConfig {
    fn default() -> Self {
        Self {
            list_dir: 1,
            read_file: 2,
            create_file: 15,
            patch_file: 20,
            per_20_changed_lines: 5,
            per_extra_file: 6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RiskPolicy {
    /// Levels at which approval is refused regardless of token.
    #[serde(default = "default_block_levels")]
    pub block_levels: Vec<RiskLevel>,
    #[serde(default)]
    pub scoring: RiskScoringConfig,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            block_levels: default_block_levels(),
            scoring: RiskScoringConfig::default(),
        }
    }
}

/// Where state lives, relative to the workspace root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    pub sqlite: PathBuf,
    pub plans_dir: PathBuf,
    pub audit_jsonl_dir: PathBuf,
    pub audit_diff_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let base = PathBuf::from(".anzen");
        Self {
            sqlite: base.join("anzen.sqlite3"),
            plans_dir: base.join("plans"),
            audit_jsonl_dir: base.join("audit").join("jsonl"),
            audit_diff_dir: base.join("audit").join("diff"),
        }
    }
}

/// Which plan-draft collaborator to use.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EngineMode {
    /// Drafts are supplied by the caller (offline use, tests).
    Scripted,
    /// Drafts come from an external planner command over stdin/stdout.
    Command,
}

impl fmt::Display for EngineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineMode::Scripted => write!(f, "scripted"),
            EngineMode::Command => write!(f, "command"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    #[serde(default = "default_engine_mode")]
    pub mode: EngineMode,
    /// Upper bound on a single draft/answer call.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_engine_command")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: default_engine_mode(),
            timeout_seconds: default_timeout_seconds(),
            command: default_engine_command(),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceConfig {
    #[serde(default = "default_instance_id")]
    pub id: String,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            id: default_instance_id(),
        }
    }
}

/// The complete policy in force for one bot instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyConfig {
    /// Policy identifier, snapshotted into every plan.
    pub version: String,
    pub executor: ExecutorPolicy,
    pub allowed_path_prefixes: Vec<String>,
    #[serde(default)]
    pub blocked_path_patterns: Vec<String>,
    #[serde(default)]
    pub users: UsersPolicy,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub plan: PlanPolicy,
    #[serde(default)]
    pub risk: RiskPolicy,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub instance: InstanceConfig,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            version: "pol_v1".to_string(),
            executor: ExecutorPolicy {
                allowed_ops: KNOWN_OPS.iter().map(|s| s.to_string()).collect(),
                prohibit: vec!["delete_file".to_string(), "shell_exec".to_string()],
            },
            allowed_path_prefixes: vec!["docs/".to_string()],
            blocked_path_patterns: vec![
                "**/.env".to_string(),
                "**/*.pem".to_string(),
                "**/*.key".to_string(),
                ".git/**".to_string(),
            ],
            users: UsersPolicy::default(),
            rate_limit: RateLimitConfig::default(),
            plan: PlanPolicy::default(),
            risk: RiskPolicy::default(),
            storage: StorageConfig::default(),
            engine: EngineConfig::default(),
            instance: InstanceConfig::default(),
        }
    }
}

impl PolicyConfig {
    /// Load and validate a policy file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| PolicyError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let policy = Self::from_yaml_str(&raw)?;
        tracing::debug!(
            path = %path.display(),
            policy_id = %policy.version,
            "policy loaded"
        );
        Ok(policy)
    }

    /// Parse and validate policy YAML.
    pub fn from_yaml_str(raw: &str) -> Result<Self, PolicyError> {
        let policy: PolicyConfig = serde_yaml::from_str(raw)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Check cross-field rules. Returns the first violation in a fixed order.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.version.trim().is_empty() || self.version.len() > 64 {
            return Err(PolicyError::invalid("version", "must be 1..=64 characters"));
        }

        if self.executor.allowed_ops.is_empty() {
            return Err(PolicyError::invalid(
                "executor.allowed_ops",
                "must list at least one operation",
            ));
        }
        for op in &self.executor.allowed_ops {
            if !KNOWN_OPS.contains(&op.as_str()) {
                return Err(PolicyError::invalid(
                    "executor.allowed_ops",
                    format!("unknown operation '{}'", op),
                ));
            }
            if self.executor.prohibit.contains(op) {
                return Err(PolicyError::invalid(
                    "executor.allowed_ops",
                    format!("operation '{}' is also prohibited", op),
                ));
            }
        }

        if self.allowed_path_prefixes.is_empty() {
            return Err(PolicyError::invalid(
                "allowed_path_prefixes",
                "must list at least one prefix",
            ));
        }
        for prefix in &self.allowed_path_prefixes {
            let p = prefix.trim().replace('\\', "/");
            let p = p.trim_end_matches('/');
            if p.is_empty() || p.starts_with('/') || p.split('/').any(|s| s == "..") {
                return Err(PolicyError::invalid(
                    "allowed_path_prefixes",
                    format!("prefix '{}' must be a non-empty relative path", prefix),
                ));
            }
        }

        for pattern in &self.blocked_path_patterns {
            if let Err(e) = glob::Pattern::new(pattern) {
                return Err(PolicyError::invalid(
                    "blocked_path_patterns",
                    format!("pattern '{}': {}", pattern, e),
                ));
            }
        }

        if self.plan.ttl_minutes == 0 {
            return Err(PolicyError::invalid("plan.ttl_minutes", "must be > 0"));
        }
        if !(6..=12).contains(&self.plan.short_token.length) {
            return Err(PolicyError::invalid(
                "plan.short_token.length",
                "must be between 6 and 12",
            ));
        }

        if self.engine.timeout_seconds == 0 {
            return Err(PolicyError::invalid("engine.timeout_seconds", "must be > 0"));
        }
        if self.engine.mode == EngineMode::Command && self.engine.command.trim().is_empty() {
            return Err(PolicyError::invalid(
                "engine.command",
                "must not be empty in command mode",
            ));
        }

        let instance_re = Regex::new(r"^[A-Za-z0-9_-]{1,40}$")
            .map_err(|e| PolicyError::invalid("instance.id", e.to_string()))?;
        if !instance_re.is_match(&self.instance.id) {
            return Err(PolicyError::invalid(
                "instance.id",
                format!("'{}' must match [A-Za-z0-9_-]{{1,40}}", self.instance.id),
            ));
        }

        Ok(())
    }

    /// Is this operation type currently permitted?
    pub fn is_op_allowed(&self, op_type: &str) -> bool {
        self.executor.allowed_ops.iter().any(|op| op == op_type)
            && !self.executor.prohibit.iter().any(|op| op == op_type)
    }

    /// Is approval refused at this risk level?
    pub fn is_level_blocked(&self, level: RiskLevel) -> bool {
        self.risk.block_levels.contains(&level)
    }

    /// Admission check against the user allowlist.
    pub fn is_user_allowed(&self, user_id: i64) -> bool {
        if self.users.allowlist_user_ids.is_empty() {
            return !self.users.fail_closed_when_empty;
        }
        self.users.allowlist_user_ids.contains(&user_id)
    }
}

fn default_true() -> bool {
    true
}

fn default_token_length() -> usize {
    8
}

fn default_block_levels() -> Vec<RiskLevel> {
    vec![RiskLevel::High, RiskLevel::Critical]
}

fn default_engine_mode() -> EngineMode {
    EngineMode::Command
}

fn default_timeout_seconds() -> u64 {
    120
}

fn default_engine_command() -> String {
    "anzen-planner".to_string()
}

fn default_instance_id() -> String {
    "default".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version: pol_test
executor:
  allowed_ops: [list_dir, read_file, create_file, patch_file]
  prohibit: [delete_file]
allowed_path_prefixes: ["docs/", "notes"]
blocked_path_patterns: ["**/.env"]
users:
  allowlist_user_ids: [42]
rate_limit:
  command_per_minute: 20
  plan_per_minute: 3
  approve_per_minute: 4
plan:
  ttl_minutes: 15
  short_token:
    length: 10
risk:
  block_levels: [CRITICAL]
"#;

    #[test]
    fn sample_policy_parses() {
        let policy = PolicyConfig::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(policy.version, "pol_test");
        assert_eq!(policy.plan.short_token.length, 10);
        assert_eq!(policy.risk.block_levels, vec![RiskLevel::Critical]);
        // Omitted sections fall back to defaults.
        assert_eq!(policy.risk.scoring, RiskScoringConfig::default());
        assert_eq!(policy.engine.mode, EngineMode::Command);
        assert_eq!(policy.instance.id, "default");
    }

    #[test]
    fn shipped_example_matches_defaults() {
        let raw = include_str!("../../../config/policy.example.yaml");
        let mut example = PolicyConfig::from_yaml_str(raw).unwrap();
        example.users = UsersPolicy::default();
        assert_eq!(example, PolicyConfig::default());
    }

    #[test]
    fn default_policy_is_valid() {
        PolicyConfig::default().validate().unwrap();
    }

    #[test]
    fn unknown_op_rejected() {
        let raw = SAMPLE.replace("patch_file]", "patch_file, run_shell]");
        let err = PolicyConfig::from_yaml_str(&raw).unwrap_err();
        assert!(err.to_string().contains("run_shell"));
    }

    #[test]
    fn prohibited_and_allowed_overlap_rejected() {
        let raw = SAMPLE.replace("prohibit: [delete_file]", "prohibit: [create_file]");
        let err = PolicyConfig::from_yaml_str(&raw).unwrap_err();
        assert!(matches!(err, PolicyError::Invalid { ref field, .. } if field == "executor.allowed_ops"));
    }

    #[test]
    fn short_token_length_bounds() {
        let raw = SAMPLE.replace("length: 10", "length: 4");
        assert!(PolicyConfig::from_yaml_str(&raw).is_err());
    }

    #[test]
    fn invalid_instance_id_rejected() {
        let mut policy = PolicyConfig::default();
        policy.instance.id = "bad id!".to_string();
        assert!(policy.validate().is_err());
    }

    #[test]
    fn absolute_prefix_rejected() {
        let mut policy = PolicyConfig::default();
        policy.allowed_path_prefixes = vec!["/etc".to_string()];
        assert!(policy.validate().is_err());
    }

    #[test]
    fn missing_file_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let err = PolicyConfig::load(dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, PolicyError::Unreadable { .. }));
    }

    #[test]
    fn malformed_yaml_rejected() {
        let err = PolicyConfig::from_yaml_str("version: [unterminated").unwrap_err();
        assert!(matches!(err, PolicyError::Malformed(_)));
    }

    #[test]
    fn allowlist_fail_closed() {
        let mut policy = PolicyConfig::default();
        assert!(!policy.is_user_allowed(1));
        policy.users.fail_closed_when_empty = false;
        assert!(policy.is_user_allowed(1));
        policy.users.allowlist_user_ids = vec![7];
        assert!(policy.is_user_allowed(7));
        assert!(!policy.is_user_allowed(1));
    }

    #[test]
    fn op_allowed_respects_prohibit() {
        let mut policy = PolicyConfig::default();
        assert!(policy.is_op_allowed("read_file"));
        policy.executor.prohibit.push("read_file".to_string());
        assert!(!policy.is_op_allowed("read_file"));
        assert!(!policy.is_op_allowed("delete_file"));
    }

    #[test]
    fn risk_level_thresholds() {
        assert_eq!(RiskLevel::from_score(0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(29), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(30), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(60), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(80), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(100), RiskLevel::Critical);
    }

    #[test]
    fn risk_level_serializes_upper_case() {
        let json = serde_yaml::to_string(&RiskLevel::Critical).unwrap();
        assert_eq!(json.trim(), "CRITICAL");
        assert_eq!("HIGH".parse::<RiskLevel>().unwrap(), RiskLevel::High);
    }
}
