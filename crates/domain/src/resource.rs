use std::fmt::{Display, Formatter};
use std::str::FromStr;

use datatag_core::AppError;
use serde::{Deserialize, Serialize};

/// Resource families tracked by the recent-write flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Dataset root entity.
    Dataset,
    /// Dataset schema.
    Schema,
    /// Import/export job.
    IoJob,
    /// Dataset version.
    Version,
    /// Dataset item.
    Item,
    /// Basic prompt.
    PromptBasic,
    /// Unpublished prompt draft.
    PromptDraft,
    /// Prompt commit.
    PromptCommit,
    /// Experiment run.
    Experiment,
    /// Evaluation set.
    EvalSet,
    /// Evaluation target.
    EvalTarget,
    /// Evaluation target version.
    EvalTargetVersion,
    /// Evaluator definition.
    Evaluator,
}

impl ResourceKind {
    /// Every known kind, in declaration order.
    pub const ALL: [Self; 13] = [
        Self::Dataset,
        Self::Schema,
        Self::IoJob,
        Self::Version,
        Self::Item,
        Self::PromptBasic,
        Self::PromptDraft,
        Self::PromptCommit,
        Self::Experiment,
        Self::EvalSet,
        Self::EvalTarget,
        Self::EvalTargetVersion,
        Self::Evaluator,
    ];

    /// Returns the stable key segment for this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dataset => "dataset",
            Self::Schema => "schema",
            Self::IoJob => "io_job",
            Self::Version => "version",
            Self::Item => "item",
            Self::PromptBasic => "prompt_basic",
            Self::PromptDraft => "prompt_draft",
            Self::PromptCommit => "prompt_commit",
            Self::Experiment => "experiment",
            Self::EvalSet => "eval_set",
            Self::EvalTarget => "eval_target",
            Self::EvalTargetVersion => "eval_target_version",
            Self::Evaluator => "evaluator",
        }
    }
}

impl Display for ResourceKind {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| AppError::Validation(format!("unknown resource kind '{value}'")))
    }
}
