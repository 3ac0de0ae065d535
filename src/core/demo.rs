//! Scripted demo conversations.
//!
//! Product demonstrations run against a fixed, hand-authored conversation
//! graph instead of a live model. States are free-form labels advanced by
//! a fixed transition table keyed on the action attached to a message
//! button; every transition plays a canned list of messages with
//! artificial delays that mimic real latency. The graph is acyclic: once
//! the note is signed the script is complete and only re-initializing
//! with a scenario starts over.

use std::time::Duration;

use crate::core::message::{ChatAction, TranscriptRole};

pub const STATE_INITIAL: &str = "initial";
pub const STATE_ANALYSIS: &str = "analysis";
pub const STATE_SOURCES: &str = "sources";
pub const STATE_ORDERS: &str = "orders";
pub const STATE_ORDERS_APPROVED: &str = "ordersApproved";
pub const STATE_NOTE: &str = "note";
pub const STATE_COMPLETE: &str = "complete";

const USER_DELAY: Duration = Duration::from_millis(500);
const ALIS_DELAY_SHORT: Duration = Duration::from_millis(1500);
const ALIS_DELAY: Duration = Duration::from_millis(2000);
const ALIS_DELAY_LONG: Duration = Duration::from_millis(2500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoScenario {
    Day1,
    Day2,
}

impl DemoScenario {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "day1" => Some(DemoScenario::Day1),
            "day2" => Some(DemoScenario::Day2),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DemoScenario::Day1 => "day1",
            DemoScenario::Day2 => "day2",
        }
    }
}

/// One canned transcript entry, played after `delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoStep {
    pub delay: Duration,
    pub role: TranscriptRole,
    pub content: String,
    pub actions: Vec<ChatAction>,
    /// Conversation state once this step has played.
    pub state_after: &'static str,
}

impl DemoStep {
    fn alis(delay: Duration, content: &str, state_after: &'static str) -> Self {
        Self {
            delay,
            role: TranscriptRole::Alis,
            content: content.to_string(),
            actions: Vec::new(),
            state_after,
        }
    }

    fn user(content: &str, state_after: &'static str) -> Self {
        Self {
            delay: USER_DELAY,
            role: TranscriptRole::User,
            content: content.to_string(),
            actions: Vec::new(),
            state_after,
        }
    }

    fn with_actions(mut self, actions: Vec<ChatAction>) -> Self {
        self.actions = actions;
        self
    }
}

pub struct DemoScript {
    scenario: DemoScenario,
    state: &'static str,
}

impl DemoScript {
    pub fn new(scenario: DemoScenario) -> Self {
        Self {
            scenario,
            state: STATE_INITIAL,
        }
    }

    pub fn scenario(&self) -> DemoScenario {
        self.scenario
    }

    pub fn state(&self) -> &'static str {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        self.state == STATE_COMPLETE
    }

    /// Greeting played when the scenario is selected.
    pub fn opening(&self) -> Vec<DemoStep> {
        match self.scenario {
            DemoScenario::Day1 => vec![DemoStep::alis(
                ALIS_DELAY_SHORT,
                "Good morning. Eleanor Vance was admitted overnight with community-acquired \
                 pneumonia. I have her intake workup ready whenever you are.",
                STATE_INITIAL,
            )
            .with_actions(vec![ChatAction::primary(
                "Review admission workup",
                "showDay1Analysis",
            )])],
            DemoScenario::Day2 => vec![DemoStep::alis(
                ALIS_DELAY_SHORT,
                "Good morning. It's hospital day 2 for Eleanor Vance. I've reviewed the \
                 overnight events and this morning's labs.",
                STATE_INITIAL,
            )
            .with_actions(vec![ChatAction::primary(
                "Review overnight events",
                "showDay2Analysis",
            )])],
        }
    }

    /// Advance the script with a named action. Returns the canned steps to
    /// play; an action that is not valid in the current state plays
    /// nothing and changes nothing.
    pub fn advance(&mut self, action: &str) -> Vec<DemoStep> {
        let steps = match (action, self.state) {
            ("showDay1Analysis", STATE_INITIAL) if self.scenario == DemoScenario::Day1 => {
                day1_analysis_steps()
            }
            ("showDay2Analysis", STATE_INITIAL) if self.scenario == DemoScenario::Day2 => {
                day2_analysis_steps()
            }
            ("showSources", STATE_SOURCES) => sources_detail_steps(),
            ("stageOrders", STATE_SOURCES) => stage_orders_steps(),
            ("approveOrders", STATE_ORDERS) => approve_orders_steps(),
            ("draftNote", STATE_ORDERS_APPROVED) => draft_note_steps(),
            ("signNote", STATE_NOTE) => sign_note_steps(),
            _ => Vec::new(),
        };

        if let Some(last) = steps.last() {
            self.state = last.state_after;
        }
        steps
    }
}

fn day1_analysis_steps() -> Vec<DemoStep> {
    vec![
        DemoStep::alis(
            ALIS_DELAY,
            "Admission workup: CURB-65 score of 2 (age, BUN 24 mg/dL). Chest X-ray shows a \
             right lower lobe infiltrate. Blood cultures were drawn before the first \
             antibiotic dose.",
            STATE_ANALYSIS,
        ),
        DemoStep::alis(
            ALIS_DELAY_LONG,
            "She was started on ceftriaxone and azithromycin per the CAP pathway. Oxygen \
             requirement is 2 L by nasal cannula, stable since arrival.",
            STATE_ANALYSIS,
        ),
        DemoStep::user("Where are these insights coming from?", STATE_ANALYSIS),
        DemoStep::alis(
            ALIS_DELAY,
            "Everything above is drawn from her chart: the admission H&P, the 04:30 lab \
             panel, and the radiology read filed at 02:10. I can show each source next to \
             its finding.",
            STATE_SOURCES,
        )
        .with_actions(vec![
            ChatAction::primary("Stage recommended orders", "stageOrders"),
            ChatAction::new("Show supporting data", "showSources"),
        ]),
    ]
}

fn day2_analysis_steps() -> Vec<DemoStep> {
    vec![
        DemoStep::alis(
            ALIS_DELAY,
            "Overnight: one episode of low-grade fever (38.1 °C at 01:40) that resolved \
             without intervention. This morning's WBC is trending down, 14.2 → 11.8. \
             Creatinine is stable at 1.1 mg/dL.",
            STATE_ANALYSIS,
        ),
        DemoStep::alis(
            ALIS_DELAY_LONG,
            "Her oxygen requirement dropped from 2 L to room air at 05:15. Taken together \
             she is tracking ahead of the expected CAP recovery course; a switch to oral \
             antibiotics is worth considering today.",
            STATE_ANALYSIS,
        ),
        DemoStep::user("Where are these insights coming from?", STATE_ANALYSIS),
        DemoStep::alis(
            ALIS_DELAY,
            "Each finding is sourced from the chart: nursing flowsheet entries for the \
             fever and oxygen wean, the 05:50 CBC and BMP for the lab trends, and the \
             IDSA/ATS guideline for the oral-switch criteria.",
            STATE_SOURCES,
        )
        .with_actions(vec![
            ChatAction::primary("Stage recommended orders", "stageOrders"),
            ChatAction::new("Show supporting data", "showSources"),
        ]),
    ]
}

fn sources_detail_steps() -> Vec<DemoStep> {
    vec![
        DemoStep::user("Show me the supporting data.", STATE_SOURCES),
        DemoStep::alis(
            ALIS_DELAY,
            "Supporting data: WBC 14.2 (admission) → 11.8 (05:50 draw). Temperature curve \
             max 38.1 °C at 01:40, afebrile since. SpO2 96% on room air since 05:15. All \
             values link back to their flowsheet rows.",
            STATE_SOURCES,
        )
        .with_actions(vec![ChatAction::primary(
            "Stage recommended orders",
            "stageOrders",
        )]),
    ]
}

fn stage_orders_steps() -> Vec<DemoStep> {
    vec![
        DemoStep::user("Stage the recommended orders.", STATE_SOURCES),
        DemoStep::alis(
            ALIS_DELAY_LONG,
            "I've staged three orders for your signature: switch ceftriaxone to oral \
             amoxicillin-clavulanate, discontinue continuous pulse oximetry, and a repeat \
             CBC for tomorrow morning. Nothing is active until you sign.",
            STATE_ORDERS,
        )
        .with_actions(vec![
            ChatAction::primary("Approve staged orders", "approveOrders"),
        ]),
    ]
}

fn approve_orders_steps() -> Vec<DemoStep> {
    vec![
        DemoStep::user("Approve the staged orders.", STATE_ORDERS),
        DemoStep::alis(
            ALIS_DELAY,
            "All three orders are signed and released. Pharmacy has verified the oral \
             switch; the first dose is scheduled for 14:00.",
            STATE_ORDERS_APPROVED,
        )
        .with_actions(vec![ChatAction::primary(
            "Draft progress note",
            "draftNote",
        )]),
    ]
}

fn draft_note_steps() -> Vec<DemoStep> {
    vec![
        DemoStep::user("Draft today's progress note.", STATE_ORDERS_APPROVED),
        DemoStep::alis(
            ALIS_DELAY_LONG,
            "Draft progress note ready: interval events, exam, lab trends, and today's \
             plan including the oral switch are pre-populated from the chart. Review and \
             sign when ready.",
            STATE_NOTE,
        )
        .with_actions(vec![ChatAction::primary("Sign note", "signNote")]),
    ]
}

fn sign_note_steps() -> Vec<DemoStep> {
    vec![
        DemoStep::user("Sign the note.", STATE_NOTE),
        DemoStep::alis(
            ALIS_DELAY,
            "Note signed and filed to the encounter. That completes morning rounds for \
             Eleanor Vance — I'll flag you if anything changes.",
            STATE_COMPLETE,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day2_analysis_is_deterministic() {
        let mut first = DemoScript::new(DemoScenario::Day2);
        let mut second = DemoScript::new(DemoScenario::Day2);
        assert_eq!(
            first.advance("showDay2Analysis"),
            second.advance("showDay2Analysis")
        );
    }

    #[test]
    fn day2_analysis_plays_fixed_messages_then_sources_pair() {
        let mut script = DemoScript::new(DemoScenario::Day2);
        assert_eq!(script.state(), STATE_INITIAL);

        let steps = script.advance("showDay2Analysis");
        assert_eq!(steps.len(), 4);

        // Two fixed analysis messages, in order.
        assert_eq!(steps[0].role, TranscriptRole::Alis);
        assert!(steps[0].content.starts_with("Overnight:"));
        assert_eq!(steps[0].state_after, STATE_ANALYSIS);
        assert_eq!(steps[1].role, TranscriptRole::Alis);
        assert!(steps[1].content.contains("oxygen requirement"));

        // Followed automatically by the sources question pair.
        assert_eq!(steps[2].role, TranscriptRole::User);
        assert_eq!(steps[2].content, "Where are these insights coming from?");
        assert_eq!(steps[3].role, TranscriptRole::Alis);
        assert_eq!(steps[3].state_after, STATE_SOURCES);

        assert_eq!(script.state(), STATE_SOURCES);
    }

    #[test]
    fn delays_mimic_real_latency() {
        let mut script = DemoScript::new(DemoScenario::Day2);
        for step in script.advance("showDay2Analysis") {
            match step.role {
                TranscriptRole::User => assert_eq!(step.delay, Duration::from_millis(500)),
                TranscriptRole::Alis => {
                    assert!(step.delay >= Duration::from_millis(1500));
                    assert!(step.delay <= Duration::from_millis(2500));
                }
                other => panic!("unexpected role in demo script: {other:?}"),
            }
        }
    }

    #[test]
    fn invalid_action_for_state_plays_nothing() {
        let mut script = DemoScript::new(DemoScenario::Day2);
        assert!(script.advance("approveOrders").is_empty());
        assert_eq!(script.state(), STATE_INITIAL);

        // Day1's opening action does not fire in a Day2 script.
        assert!(script.advance("showDay1Analysis").is_empty());
    }

    #[test]
    fn note_signed_flow_reaches_terminal_state() {
        let mut script = DemoScript::new(DemoScenario::Day2);
        script.advance("showDay2Analysis");
        script.advance("stageOrders");
        script.advance("approveOrders");
        script.advance("draftNote");
        script.advance("signNote");

        assert!(script.is_complete());
        // No transition leads out of the terminal state.
        assert!(script.advance("showDay2Analysis").is_empty());
        assert!(script.advance("signNote").is_empty());
        assert_eq!(script.state(), STATE_COMPLETE);
    }

    #[test]
    fn scenario_names_round_trip() {
        assert_eq!(DemoScenario::parse("day2"), Some(DemoScenario::Day2));
        assert_eq!(DemoScenario::parse("day9"), None);
        assert_eq!(DemoScenario::Day1.as_str(), "day1");
    }
}
