//! Result files of an analysis run.
//!
//! Layout under the results directory:
//!
//! ```text
//! analysis_<timestamp>/
//!     analysis_results.json   full record
//!     <role>_output.json      phase outputs of one role
//!     analysis_summary.txt    reviews and synthesis as plain text
//! ```

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::agent::REVIEW_PHASE;
use crate::orchestrator::AnalysisRecord;

pub const RESULTS_FILE: &str = "analysis_results.json";
pub const SUMMARY_FILE: &str = "analysis_summary.txt";

/// Directory holding the files of the run recorded at `timestamp`
pub fn run_dir(base: &Path, timestamp: &str) -> PathBuf {
    base.join(format!("analysis_{}", timestamp))
}

/// Write every result file of a run and return the run directory.
pub fn write_results(base: &Path, record: &AnalysisRecord) -> io::Result<PathBuf> {
    let dir = run_dir(base, &record.timestamp);
    fs::create_dir_all(&dir)?;

    fs::write(dir.join(RESULTS_FILE), to_pretty_json(record)?)?;
    for (role, outputs) in &record.agent_outputs {
        fs::write(
            dir.join(format!("{}_output.json", role)),
            to_pretty_json(outputs)?,
        )?;
    }
    fs::write(dir.join(SUMMARY_FILE), render_summary(record))?;

    info!(path = %dir.display(), "Analysis results written");
    Ok(dir)
}

fn to_pretty_json<T: serde::Serialize>(value: &T) -> io::Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Plain-text summary: the question, each role's review and the synthesis
pub fn render_summary(record: &AnalysisRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Analysis Summary");
    let _ = writeln!(out, "{}\n", "=".repeat(50));
    match &record.hypothetical {
        Some(hypothetical) => {
            let _ = writeln!(out, "Hypothetical: {}\n", hypothetical);
        }
        None => {
            let _ = writeln!(out, "Question: {}\n", record.legal_question);
        }
    }
    let _ = writeln!(out, "Analysis Date: {}", record.timestamp);
    let _ = writeln!(out, "Model: {}\n", record.model);

    for (role, outputs) in &record.agent_outputs {
        if let Some(review) = outputs.get(REVIEW_PHASE) {
            let _ = writeln!(out, "Review ({}):", role);
            let _ = writeln!(out, "{}", "-".repeat(20));
            let _ = writeln!(out, "{}\n", review);
        }
    }

    let synthesis = &record.final_synthesis;
    let _ = writeln!(out, "Synthesis:");
    let _ = writeln!(out, "{}", "-".repeat(20));
    let _ = writeln!(out, "{}\n", synthesis.synthesis);
    let _ = writeln!(
        out,
        "Average score: {:.2} ({})",
        synthesis.average_score, synthesis.feedback_tier
    );
    let _ = writeln!(out, "Requires revision: {}", synthesis.requires_revision);
    let _ = writeln!(out, "{}", synthesis.feedback_template);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::PhaseOutputs;
    use crate::orchestrator::FinalSynthesis;
    use crate::synthesis::FeedbackTier;
    use std::collections::BTreeMap;

    fn record() -> AnalysisRecord {
        AnalysisRecord {
            run_id: "run".to_string(),
            legal_question: "Is the penalty clause enforceable?".to_string(),
            hypothetical: None,
            timestamp: "20240102_030405".to_string(),
            model: "openai:gpt-4o-mini".to_string(),
            agent_outputs: BTreeMap::from([
                (
                    "internal".to_string(),
                    PhaseOutputs::from([("review".to_string(), "sg review".to_string())]),
                ),
                (
                    "external".to_string(),
                    PhaseOutputs::from([("review".to_string(), "us review".to_string())]),
                ),
            ]),
            final_synthesis: FinalSynthesis {
                synthesis: "merged".to_string(),
                recommendations: vec![],
                scores: BTreeMap::from([("legal_reasoning".to_string(), 5)]),
                average_score: 5.0,
                requires_revision: true,
                feedback_tier: FeedbackTier::RevisionNeeded,
                feedback_template: "Please revise.".to_string(),
            },
        }
    }

    #[test]
    fn test_write_results_layout() {
        let base = tempfile::tempdir().unwrap();
        let dir = write_results(base.path(), &record()).unwrap();

        assert_eq!(dir, base.path().join("analysis_20240102_030405"));
        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.join(RESULTS_FILE)).unwrap()).unwrap();
        assert_eq!(written["legal_question"], "Is the penalty clause enforceable?");
        assert_eq!(written["final_synthesis"]["requires_revision"], true);
        assert!(dir.join("internal_output.json").exists());
        assert!(dir.join("external_output.json").exists());
        assert!(dir.join(SUMMARY_FILE).exists());
    }

    #[test]
    fn test_summary_mentions_reviews_and_tier() {
        let summary = render_summary(&record());
        assert!(summary.contains("Question: Is the penalty clause enforceable?"));
        assert!(summary.contains("Review (internal):"));
        assert!(summary.contains("us review"));
        assert!(summary.contains("Average score: 5.00 (revision_needed)"));
    }
}
