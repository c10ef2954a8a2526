//! Prompt templates for the debate roles.
//!
//! Every function here is pure string building. The JSON output contracts are
//! embedded as literal text and use the same field names the extractor reads
//! (`time_horizon_predictions`, `final_predictions`, `confidence_scores`, ...).
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever template content changes
//! so stored results can be traced back to the prompts that produced them.

use std::fmt::Write as _;

use crate::debate::{DebateRole, DebateTurn};
use crate::types::{ForecastQuestion, TimeHorizon};

/// Prompt version. Bump on any template change.
pub const PROMPT_VERSION: &str = "2.1.0";

/// Searches an advocate is assumed to spend per rebuttal round.
const SEARCHES_PER_ROUND: u32 = 2;

const HIGH_ADVOCATE_BACKSTORY: &str = "\
You are an expert superforecaster acting as the High Probability Advocate. \
You build the strongest honest case that the event WILL happen.

## How you work
1. Evidence: look for independent, recent, credible sources that point toward \
the event occurring. Weigh momentum, enabling conditions and stated plans.
2. Estimation: start from a reference-class base rate, then adjust upward only \
as far as the evidence carries you.
3. Bias awareness: you are an advocate, not a cheerleader. Acknowledge the \
strongest counter-evidence and keep your numbers calibrated.
4. Search discipline: spend searches on the most diagnostic evidence, not on \
confirming what you already believe.";

const LOW_ADVOCATE_BACKSTORY: &str = "\
You are an expert superforecaster acting as the Low Probability Advocate. \
You build the strongest honest case that the event will NOT happen.

## How you work
1. Evidence: look for obstacles, missing prerequisites, failure modes and \
historical precedents of similar efforts falling short.
2. Estimation: start from a reference-class base rate, then adjust downward \
only as far as the evidence carries you.
3. Risk reasoning: consider how obstacles compound over longer horizons and \
where optimistic assumptions are doing the work.
4. Search discipline: look for expert skepticism and hard constraints such as \
budgets, deadlines and regulation.";

const JUDGE_BACKSTORY: &str = "\
You are an expert superforecaster acting as an impartial Debate Judge. \
You turn competing arguments into calibrated probabilities.

## How you judge
1. Evidence: compare the quality, independence and recency of the evidence \
each advocate cited. Discount claims nobody sourced.
2. Arguments: check logical consistency and which rebuttals actually landed.
3. Synthesis: anchor on the base rate and adjust by the strongest evidence. \
Do not simply average the two advocates.
4. Horizons: give a separate estimate per time horizon. Longer horizons leave \
more time for the event to occur.
5. Calibration: state how good the evidence really was, and follow the \
calibration rules below.";

/// Rules the judge is told about. The same rules are enforced after the fact.
const CALIBRATION_RULES: &str = "\
## Calibration rules
- If evidence quality is below 0.4, stay within 10 points of the base rate.
- If evidence quality is below 0.6, keep every probability within [0.20, 0.80].
- If evidence quality is below 0.7, keep every probability within [0.15, 0.85].
- If the advocates differ by more than 40 points, do not move more than 10 \
points from the base rate unless the evidence is overwhelming; set \
\"overwhelming_evidence\": true only when it is.
- Probabilities below 0.10 or above 0.90 require evidence quality above 0.85 \
and a base rate in the same extreme.
- Avoid reflexive hedging toward 0.50 when the evidence clearly points one way.";

/// Persona for an advocate. The judge's persona is returned for `Judge`.
pub fn advocate_backstory(stance: DebateRole) -> &'static str {
    match stance {
        DebateRole::HighAdvocate => HIGH_ADVOCATE_BACKSTORY,
        DebateRole::LowAdvocate => LOW_ADVOCATE_BACKSTORY,
        DebateRole::Judge => JUDGE_BACKSTORY,
    }
}

pub fn judge_backstory() -> &'static str {
    JUDGE_BACKSTORY
}

/// Budget line embedded in advocate prompts. Advisory only; nothing counts
/// actual searches.
pub fn search_budget_line(budget: u32, round: u32) -> String {
    if round <= 1 {
        format!("You have a budget of {budget} searches for this debate. Use them wisely.")
    } else {
        let used = (round - 1) * SEARCHES_PER_ROUND;
        let remaining = budget.saturating_sub(used);
        format!(
            "You have approximately {remaining} searches left of your {budget}-search budget."
        )
    }
}

/// Follow-up focus for rebuttal rounds, cycled by round.
const REBUTTAL_FOCUS: &[&str] = &[
    "latest developments",
    "expert analysis forecast",
    "official statement data",
    "recent report",
];

/// Search query an advocate's research step issues for a turn. Each round
/// gets its own query so later rounds look for new evidence.
pub fn research_query(question: &str, stance: DebateRole, round: u32) -> String {
    let angle = match stance {
        DebateRole::HighAdvocate => "progress momentum support",
        DebateRole::LowAdvocate => "obstacles delays criticism",
        DebateRole::Judge => "latest news",
    };
    if round <= 1 {
        return format!("{question} {angle}");
    }
    let i = (round as usize - 2) % REBUTTAL_FOCUS.len();
    let cycle = (round as usize - 2) / REBUTTAL_FOCUS.len();
    if cycle == 0 {
        format!("{question} {angle} {}", REBUTTAL_FOCUS[i])
    } else {
        format!("{question} {angle} {} round {round}", REBUTTAL_FOCUS[i])
    }
}

fn horizon_list(horizons: &[TimeHorizon]) -> String {
    horizons
        .iter()
        .map(|h| h.label())
        .collect::<Vec<_>>()
        .join(", ")
}

/// JSON contract an advocate must answer with.
pub fn advocate_output_contract(horizons: &[TimeHorizon]) -> String {
    let entries = horizons
        .iter()
        .map(|h| {
            format!(
                "    \"{}\": {{\"probability\": <0.0-1.0>, \"confidence\": \"LOW|MEDIUM|HIGH\", \"reasoning\": \"<why>\"}}",
                h.json_key()
            )
        })
        .collect::<Vec<_>>()
        .join(",\n");
    format!(
        "{{\n  \"time_horizon_predictions\": {{\n{entries}\n  }},\n  \
\"base_rate\": <0.0-1.0>,\n  \
\"key_arguments\": [\"<argument>\", \"...\"],\n  \
\"position_statement\": \"<one paragraph>\",\n  \
\"evidence_summary\": \"<what the evidence shows>\"\n}}"
    )
}

/// JSON contract the judge must answer with.
pub fn judge_output_contract(horizons: &[TimeHorizon]) -> String {
    let map = |value: &str| {
        horizons
            .iter()
            .map(|h| format!("\"{}\": {value}", h.json_key()))
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!(
        "{{\n  \"final_predictions\": {{{}}},\n  \
\"confidence_scores\": {{{}}},\n  \
\"reasoning\": {{{}}},\n  \
\"base_rate\": <0.0-1.0>,\n  \
\"evidence_quality\": <0.0-1.0>,\n  \
\"overwhelming_evidence\": <true|false>,\n  \
\"debate_summary\": \"<which arguments won and why>\"\n}}",
        map("<0.0-1.0>"),
        map("\"LOW|MEDIUM|HIGH\""),
        map("\"<why>\"")
    )
}

fn question_block(question: &ForecastQuestion) -> String {
    let mut out = format!("## Question\n{}\n", question.text.trim());
    if !question.background.trim().is_empty() {
        let _ = write!(out, "\n## Background\n{}\n", question.background.trim());
    }
    if let Some(cutoff) = question.training_cutoff_date {
        let _ = write!(
            out,
            "\n## Information cutoff\nReason as of {cutoff}. Ignore anything you know from after this date.\n"
        );
    }
    out
}

fn render_turn(turn: &DebateTurn) -> String {
    format!(
        "### Round {}: {}\n{}\n",
        turn.round_number,
        turn.role.title(),
        turn.raw_response_text.trim()
    )
}

/// Inputs for one advocate task prompt.
#[derive(Debug, Clone, Copy)]
pub struct AdvocateBrief<'a> {
    pub question: &'a ForecastQuestion,
    pub stance: DebateRole,
    pub round: u32,
    pub total_rounds: u32,
    pub search_budget: u32,
    /// Formatted search results for this turn.
    pub evidence: &'a str,
}

/// Task prompt for an advocate turn.
///
/// From round 2 on, the opposing advocate's immediately preceding turn is
/// embedded verbatim.
pub fn advocate_task(brief: &AdvocateBrief<'_>, opponent_prior: Option<&DebateTurn>) -> String {
    let AdvocateBrief {
        question,
        stance,
        round,
        total_rounds,
        search_budget,
        evidence,
    } = *brief;
    let side = match stance {
        DebateRole::LowAdvocate => "LOW",
        _ => "HIGH",
    };

    let mut out = question_block(question);
    let _ = write!(
        out,
        "\n## Your task (round {round} of {total_rounds})\n{}\n",
        search_budget_line(search_budget, round)
    );

    match opponent_prior.filter(|_| round > 1) {
        Some(prior) => {
            let opponent = prior.role.title();
            let _ = write!(
                out,
                "Rebut the {opponent}'s latest argument and strengthen the case for a {side} probability. \
Concede points that are genuinely strong and update your estimates if warranted.\n\n\
## {opponent}'s previous argument\n{}\n",
                prior.raw_response_text.trim()
            );
        }
        None => {
            let _ = writeln!(
                out,
                "Present your opening case for a {side} probability for each time horizon: {}.",
                horizon_list(&question.time_horizons)
            );
        }
    }

    let evidence = if evidence.trim().is_empty() {
        "No evidence found."
    } else {
        evidence.trim()
    };
    let _ = write!(out, "\n## Research results\n{evidence}\n");

    let _ = write!(
        out,
        "\n## Output format\nRespond with ONLY this JSON object:\n{}\n",
        advocate_output_contract(&question.time_horizons)
    );
    out
}

/// Task prompt for the judge: every turn of every round, in order, plus a
/// request for one probability per horizon.
pub fn judge_task(
    question: &ForecastQuestion,
    all_turns: &[DebateTurn],
    time_horizons: &[TimeHorizon],
) -> String {
    let mut out = question_block(question);
    out.push_str("\n## Debate transcript\n");
    if all_turns.is_empty() {
        out.push_str("(no arguments were recorded)\n");
    }
    for turn in all_turns {
        out.push_str(&render_turn(turn));
        out.push('\n');
    }
    let _ = write!(
        out,
        "## Your task\nWeigh both sides and give one calibrated probability for each time horizon: {}.\n\n{CALIBRATION_RULES}\n",
        horizon_list(time_horizons)
    );
    let _ = write!(
        out,
        "\n## Output format\nRespond with ONLY this JSON object:\n{}\n",
        judge_output_contract(time_horizons)
    );
    out
}
