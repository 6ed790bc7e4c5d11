//! A seeded customer-support simulation.
//!
//! Each episode presents one support ticket. The agent is expected to look
//! the customer up with the right lookup tool, apply the ticket's resolution
//! tool, and send a reply; escalation is always available as a safe but
//! low-scoring exit. Wrong tools are rejected by the environment, which
//! exercises the rejected-step path without ending the episode.
//!
//! Ticket order is derived from the scenario seed, so two scenario instances
//! with the same seed replay the same episode sequence.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::env::{ActionOutcome, Decision, EnvObservation, Environment};
use crate::error::EnvironmentInitError;
use crate::trajectory::types::{DecisionComponent, Outcome, Trajectory};

use super::traits::{Scenario, TrainableMap};

const ESCALATE: &str = "escalate";
const SEND_REPLY: &str = "send_reply";

/// A canned support ticket with its expected tool sequence.
#[derive(Debug, Clone)]
struct Ticket {
    subject: &'static str,
    body: &'static str,
    lookup_tool: &'static str,
    resolution_tool: &'static str,
}

const TICKETS: &[Ticket] = &[
    Ticket {
        subject: "charged twice for one order",
        body: "My card shows two charges for order 5531 but I only ordered once.",
        lookup_tool: "lookup_invoice",
        resolution_tool: "issue_refund",
    },
    Ticket {
        subject: "package never arrived",
        body: "Order 2209 was marked delivered last week but nothing showed up.",
        lookup_tool: "lookup_order",
        resolution_tool: "resend_package",
    },
    Ticket {
        subject: "cannot sign in",
        body: "Password reset emails never reach my inbox and I am locked out.",
        lookup_tool: "lookup_account",
        resolution_tool: "reset_password",
    },
];

const LOOKUP_TOOLS: &[&str] = &["lookup_invoice", "lookup_order", "lookup_account"];
const RESOLUTION_TOOLS: &[&str] = &["issue_refund", "resend_package", "reset_password"];

/// The customer-support task definition.
pub struct CustomerSupportScenario {
    map: TrainableMap,
    /// Ticket visit order, fixed at construction from the seed.
    ticket_order: Vec<usize>,
    episode_counter: AtomicUsize,
}

impl CustomerSupportScenario {
    pub fn new(seed: u64) -> Self {
        let mut ticket_order: Vec<usize> = (0..TICKETS.len()).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        ticket_order.shuffle(&mut rng);

        Self {
            map: TrainableMap::from_pairs(&[
                (DecisionComponent::ToolSelection, true),
                (DecisionComponent::ParameterSelection, true),
                (DecisionComponent::ToolExecution, false),
                (DecisionComponent::OutputGeneration, false),
            ]),
            ticket_order,
            episode_counter: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Scenario for CustomerSupportScenario {
    fn name(&self) -> &str {
        "support-sim"
    }

    async fn create_environment(&self) -> Result<Box<dyn Environment>, EnvironmentInitError> {
        let episode = self.episode_counter.fetch_add(1, Ordering::SeqCst);
        let ticket_idx = self.ticket_order[episode % self.ticket_order.len()];
        Ok(Box::new(SupportEnv::new(TICKETS[ticket_idx].clone())))
    }

    fn evaluate_outcome(&self, trajectory: &Trajectory) -> Outcome {
        let accepted: Vec<&str> = trajectory
            .steps
            .iter()
            .filter(|s| s.rejected.is_none())
            .map(|s| s.tool.as_str())
            .collect();

        match accepted.last() {
            Some(&SEND_REPLY) => {
                // A reply only resolves the ticket if the resolution tool ran.
                let resolved = accepted
                    .iter()
                    .any(|t| RESOLUTION_TOOLS.contains(t));
                if resolved {
                    Outcome::Score(1.0)
                } else {
                    Outcome::Score(0.0)
                }
            }
            Some(&ESCALATE) => Outcome::Score(0.25),
            _ => Outcome::Undefined,
        }
    }

    fn trainable_components(&self) -> &TrainableMap {
        &self.map
    }
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    /// Waiting for the correct lookup tool.
    Triage,
    /// Customer found; waiting for the resolution tool.
    Working,
    /// Resolution applied; waiting for the reply.
    Replying,
    Closed,
}

struct SupportEnv {
    ticket: Ticket,
    phase: Phase,
}

impl SupportEnv {
    fn new(ticket: Ticket) -> Self {
        Self {
            ticket,
            phase: Phase::Triage,
        }
    }

    fn observation(&self) -> EnvObservation {
        match self.phase {
            Phase::Triage => EnvObservation::new(
                format!(
                    "ticket: {} -- {}",
                    self.ticket.subject, self.ticket.body
                ),
                LOOKUP_TOOLS
                    .iter()
                    .map(|t| t.to_string())
                    .chain([ESCALATE.to_string()])
                    .collect(),
            ),
            Phase::Working => EnvObservation::new(
                format!("customer record found for: {}", self.ticket.subject),
                RESOLUTION_TOOLS
                    .iter()
                    .map(|t| t.to_string())
                    .chain([ESCALATE.to_string()])
                    .collect(),
            ),
            Phase::Replying => EnvObservation::new(
                "resolution applied, customer awaiting confirmation",
                vec![SEND_REPLY.to_string(), ESCALATE.to_string()],
            ),
            Phase::Closed => EnvObservation::terminal("ticket closed"),
        }
    }
}

#[async_trait]
impl Environment for SupportEnv {
    async fn observe(&mut self) -> anyhow::Result<EnvObservation> {
        Ok(self.observation())
    }

    async fn apply(&mut self, decision: &Decision) -> anyhow::Result<ActionOutcome> {
        let tool = decision.tool.as_str();

        if tool == ESCALATE {
            self.phase = Phase::Closed;
            return Ok(ActionOutcome::accepted(self.observation(), 0.0));
        }

        match self.phase {
            Phase::Triage => {
                if tool == self.ticket.lookup_tool {
                    self.phase = Phase::Working;
                    Ok(ActionOutcome::accepted(self.observation(), 0.1))
                } else if LOOKUP_TOOLS.contains(&tool) {
                    Ok(ActionOutcome::rejected(
                        self.observation(),
                        format!("{tool} found no matching record"),
                    ))
                } else {
                    Ok(ActionOutcome::rejected(
                        self.observation(),
                        format!("tool '{tool}' not available during triage"),
                    ))
                }
            }
            Phase::Working => {
                if tool == self.ticket.resolution_tool {
                    self.phase = Phase::Replying;
                    Ok(ActionOutcome::accepted(self.observation(), 0.2))
                } else if RESOLUTION_TOOLS.contains(&tool) {
                    Ok(ActionOutcome::rejected(
                        self.observation(),
                        format!("{tool} does not apply to this ticket"),
                    ))
                } else {
                    Ok(ActionOutcome::rejected(
                        self.observation(),
                        format!("tool '{tool}' not available while resolving"),
                    ))
                }
            }
            Phase::Replying => {
                if tool == SEND_REPLY {
                    self.phase = Phase::Closed;
                    Ok(ActionOutcome::accepted(self.observation(), 0.2))
                } else {
                    Ok(ActionOutcome::rejected(
                        self.observation(),
                        format!("tool '{tool}' not available when replying"),
                    ))
                }
            }
            Phase::Closed => Ok(ActionOutcome::rejected(
                self.observation(),
                "ticket already closed",
            )),
        }
    }
}
