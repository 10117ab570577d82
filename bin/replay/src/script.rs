//! Operation scripts and per-step reports

use std::io::Write;

use anyhow::{Context, Result};
use merkle_accqueue::{AccQueue, AccQueueConfig, DecimalField, format_field_hex};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Accumulator configuration plus the operations to apply in order
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Script {
    /// Falls back to the environment when absent
    #[serde(default)]
    pub(crate) config: Option<AccQueueConfig>,
    pub(crate) ops: Vec<Op>,
}

/// One accumulator call
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum Op {
    Enqueue { leaf: DecimalField },
    Fill,
    InsertSubTree { root: DecimalField },
    MergeSubRoots {
        #[serde(default)]
        count: usize,
    },
    Merge { depth: usize },
}

impl Op {
    const fn name(&self) -> &'static str {
        match self {
            Self::Enqueue { .. } => "enqueue",
            Self::Fill => "fill",
            Self::InsertSubTree { .. } => "insert_sub_tree",
            Self::MergeSubRoots { .. } => "merge_sub_roots",
            Self::Merge { .. } => "merge",
        }
    }
}

/// State after one step, written as a single JSON line
#[derive(Debug, Clone, Serialize)]
pub(crate) struct StepReport {
    pub(crate) step: usize,
    pub(crate) op: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) leaf_index: Option<u128>,
    pub(crate) num_leaves: u128,
    pub(crate) num_subtrees: usize,
    pub(crate) small_srt_root: Option<DecimalField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) main_root: Option<DecimalField>,
}

/// Totals for a finished run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Summary {
    pub(crate) steps: usize,
    pub(crate) failed: usize,
}

impl Script {
    pub(crate) fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("failed to parse operation script")
    }

    /// Apply every operation and write one report line per step.
    ///
    /// A failing operation is reported and the run continues; the queue is
    /// unchanged by a failed call.
    pub(crate) fn run(&self, out: &mut impl Write) -> Result<Summary> {
        let config = self.config.clone().unwrap_or_else(AccQueueConfig::from_env);
        let mut queue = config.build().context("invalid accumulator configuration")?;
        debug!(target: "accqueue_replay", ?config, ops = self.ops.len(), "replaying script");

        let mut summary = Summary::default();
        for (step, op) in self.ops.iter().enumerate() {
            let report = apply(&mut queue, step, op);
            if let Some(error) = &report.error {
                warn!(target: "accqueue_replay", step, op = op.name(), %error, "operation failed");
                summary.failed += 1;
            }
            serde_json::to_writer(&mut *out, &report).context("failed to write report")?;
            writeln!(out).context("failed to write report")?;
            summary.steps += 1;
        }
        Ok(summary)
    }
}

fn apply(queue: &mut AccQueue, step: usize, op: &Op) -> StepReport {
    let mut leaf_index = None;
    let mut main_root = None;
    let result = match op {
        Op::Enqueue { leaf } => queue.enqueue(leaf.0).map(|index| leaf_index = Some(index)),
        Op::Fill => queue.fill(),
        Op::InsertSubTree { root } => queue.insert_sub_tree(root.0),
        Op::MergeSubRoots { count } => queue.merge_sub_roots(*count),
        Op::Merge { depth } => queue.merge(*depth).map(|root| {
            debug!(target: "accqueue_replay", depth, root = %format_field_hex(&root), "merged");
            main_root = Some(DecimalField(root));
        }),
    };

    StepReport {
        step,
        op: op.name(),
        error: result.err().map(|e| e.to_string()),
        leaf_index,
        num_leaves: queue.num_leaves(),
        num_subtrees: queue.num_subtrees(),
        small_srt_root: queue.small_srt_root().map(DecimalField),
        main_root,
    }
}
